#[cfg(test)]
#[path = "model_id_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;
use strum::EnumIter;
use strum::EnumString;
use strum::EnumVariantNames;

/// Models the companion server knows how to load.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    EnumVariantNames,
    strum::Display,
)]
pub enum ModelId {
    #[default]
    #[serde(rename = "qwen15")]
    #[strum(serialize = "qwen15")]
    Qwen15,
    #[serde(rename = "qwen15-4q")]
    #[strum(serialize = "qwen15-4q")]
    Qwen15Q4,
    #[serde(rename = "phi3")]
    #[strum(serialize = "phi3")]
    Phi3,
}

impl ModelId {
    pub fn label(&self) -> &'static str {
        match self {
            ModelId::Qwen15 => return "Qwen 1.5 (Q2_K)",
            ModelId::Qwen15Q4 => return "Qwen 1.5 (Q4_0)",
            ModelId::Phi3 => return "Phi-3 mini (IQ1_S)",
        }
    }
}
