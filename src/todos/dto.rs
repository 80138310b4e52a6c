use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CreateTodoRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Deserialize)]
pub struct UpdateTodoRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_defaults_completed_to_false() {
        let req: CreateTodoRequest = serde_json::from_str(r#"{"title":"buy milk"}"#).unwrap();
        assert_eq!(req.title, "buy milk");
        assert!(req.description.is_none());
        assert!(!req.completed);
    }

    #[test]
    fn update_fields_are_all_optional() {
        let req: UpdateTodoRequest = serde_json::from_str(r#"{"completed":true}"#).unwrap();
        assert!(req.title.is_none());
        assert_eq!(req.completed, Some(true));
    }
}
