/// A structured text component, carried on the wire as a JSON string.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Chat(serde_json::Value);

impl Chat {
    pub fn text(msg: impl Into<String>) -> Self {
        Self(serde_json::json!({ "text": msg.into() }))
    }
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
    pub fn to_json(&self) -> String {
        self.0.to_string()
    }
    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }
}
impl From<&str> for Chat {
    fn from(msg: &str) -> Self {
        Self::text(msg)
    }
}
