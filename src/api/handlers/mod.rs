pub mod auth;
pub mod files;
pub mod folders;
pub mod health;
pub mod recycle;
pub mod shares;
pub mod users;

use serde::{Deserialize, Deserializer};

/// Tells an absent field (`None`) apart from an explicit `null`
/// (`Some(None)`), so PATCH bodies can move items back to the root.
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        folder_id: Option<Option<String>>,
    }

    #[test]
    fn test_double_option() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.folder_id, None);

        let null: Patch = serde_json::from_str(r#"{"folder_id":null}"#).unwrap();
        assert_eq!(null.folder_id, Some(None));

        let set: Patch = serde_json::from_str(r#"{"folder_id":"abc"}"#).unwrap();
        assert_eq!(set.folder_id, Some(Some("abc".to_string())));
    }
}
