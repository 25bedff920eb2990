use serde_json::{Map, Value};

/// How a JSON object was obtained from a model's raw output.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
	/// The whole text parsed as a JSON object.
	Direct(Map<String, Value>),
	/// An object was found between the first `{` and the last `}`.
	Recovered(Map<String, Value>),
	Failed,
}

impl ParseOutcome {
	pub fn was_direct(&self) -> bool {
		matches!(self, ParseOutcome::Direct(_))
	}

	pub fn object(&self) -> Option<&Map<String, Value>> {
		match self {
			ParseOutcome::Direct(obj) | ParseOutcome::Recovered(obj) => Some(obj),
			ParseOutcome::Failed => None,
		}
	}

	/// True when an object was found and it has at least one key.
	pub fn has_content(&self) -> bool {
		self.object().is_some_and(|obj| !obj.is_empty())
	}

	/// `(object, was_direct)`, with an empty object on failure.
	pub fn into_parts(self) -> (Map<String, Value>, bool) {
		match self {
			ParseOutcome::Direct(obj) => (obj, true),
			ParseOutcome::Recovered(obj) => (obj, false),
			ParseOutcome::Failed => (Map::new(), false),
		}
	}
}

/// Best-effort extraction of a JSON object from model output.
///
/// Tolerates prose and code fences around the object. Never fails.
pub fn extract_json(text: &str) -> ParseOutcome {
	if let Some(obj) = parse_object(text) {
		return ParseOutcome::Direct(obj);
	}
	match outermost_braces(text).and_then(parse_object) {
		Some(obj) => ParseOutcome::Recovered(obj),
		None => ParseOutcome::Failed,
	}
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
	match serde_json::from_str::<Value>(text).ok()? {
		Value::Object(obj) => Some(obj),
		_ => None,
	}
}

// Greedy: first `{` through last `}`, newlines included.
fn outermost_braces(text: &str) -> Option<&str> {
	let start = text.find('{')?;
	let end = text.rfind('}')?;
	(end > start).then(|| &text[start..=end])
}
