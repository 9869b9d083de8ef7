//! Pipeline input and the candidate ideas generated from it.

use serde::{Deserialize, Serialize};

use super::error::ValidationError;

/// Maximum characters accepted for a topic.
pub const TOPIC_MAX_CHARS: usize = 50;
/// Maximum characters accepted for the intent sentence.
pub const INTENT_MAX_CHARS: usize = 200;

/// The immutable run input.
///
/// Fields are private so a `Topic` can only be built through [`Topic::new`],
/// which enforces the length bounds once at pipeline start. Deserialization
/// goes through the same constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TopicRecord")]
pub struct Topic {
    text: String,
    intent: Option<String>,
    outline: Vec<String>,
}

#[derive(Deserialize)]
struct TopicRecord {
    text: String,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    outline: Vec<String>,
}

impl TryFrom<TopicRecord> for Topic {
    type Error = ValidationError;

    fn try_from(record: TopicRecord) -> Result<Self, Self::Error> {
        Ok(Topic::new(&record.text, record.intent.as_deref())?.with_outline(record.outline))
    }
}

impl Topic {
    pub fn new(text: &str, intent: Option<&str>) -> Result<Self, ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::Empty { field: "topic" });
        }
        let len = text.chars().count();
        if len > TOPIC_MAX_CHARS {
            return Err(ValidationError::TooLong {
                field: "topic",
                len,
                max: TOPIC_MAX_CHARS,
            });
        }

        let intent = match intent.map(str::trim) {
            None => None,
            Some("") => return Err(ValidationError::Empty { field: "intent" }),
            Some(i) => {
                let len = i.chars().count();
                if len > INTENT_MAX_CHARS {
                    return Err(ValidationError::TooLong {
                        field: "intent",
                        len,
                        max: INTENT_MAX_CHARS,
                    });
                }
                Some(i.to_string())
            }
        };

        Ok(Self {
            text: text.to_string(),
            intent,
            outline: Vec::new(),
        })
    }

    /// Attach a structured outline; blank lines are dropped.
    pub fn with_outline<I, S>(mut self, outline: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outline = outline
            .into_iter()
            .map(Into::into)
            .filter(|s: &String| !s.trim().is_empty())
            .collect();
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn intent(&self) -> Option<&str> {
        self.intent.as_deref()
    }

    pub fn outline(&self) -> &[String] {
        &self.outline
    }
}

/// Stable identifier linking an idea to its provenance entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdeaId(pub String);

impl IdeaId {
    pub fn from_index(index: usize) -> Self {
        IdeaId(format!("idea-{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdeaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A candidate angle on the topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idea {
    pub id: IdeaId,
    pub name: String,
    pub description: String,
    pub why_underexplored: String,
    /// Author name, or `model-generated`.
    pub source: String,
    pub model_generated: bool,
}

/// Raw idea shape returned by the generation backend, before ids are assigned.
#[derive(Debug, Clone, Deserialize)]
pub struct IdeaDraft {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub why_underexplored: String,
    #[serde(default = "model_generated_source")]
    pub source: String,
    #[serde(default, alias = "is_model_generated")]
    pub model_generated: bool,
}

fn model_generated_source() -> String {
    "model-generated".to_string()
}

/// Ordered ideas produced by the generation stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeaSet {
    ideas: Vec<Idea>,
}

impl IdeaSet {
    /// Assign stable ids in generation order.
    pub fn from_drafts(drafts: Vec<IdeaDraft>) -> Self {
        let ideas = drafts
            .into_iter()
            .enumerate()
            .map(|(i, d)| Idea {
                id: IdeaId::from_index(i),
                name: d.name,
                description: d.description,
                why_underexplored: d.why_underexplored,
                source: d.source,
                model_generated: d.model_generated,
            })
            .collect();
        Self { ideas }
    }

    pub fn get(&self, id: &IdeaId) -> Option<&Idea> {
        self.ideas.iter().find(|i| &i.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Idea> {
        self.ideas.iter()
    }

    pub fn len(&self) -> usize {
        self.ideas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ideas.is_empty()
    }
}

impl<'a> IntoIterator for &'a IdeaSet {
    type Item = &'a Idea;
    type IntoIter = std::slice::Iter<'a, Idea>;

    fn into_iter(self) -> Self::IntoIter {
        self.ideas.iter()
    }
}
