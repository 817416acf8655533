use serde_derive::Deserialize;
use serde_derive::Serialize;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    #[default]
    User,
    Assistant,
}

impl ToString for Author {
    fn to_string(&self) -> String {
        match self {
            Author::User => return String::from("You"),
            Author::Assistant => return String::from("Assistant"),
        }
    }
}
