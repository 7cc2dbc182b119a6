//! Labels derived from the `"type"` field of a JSON log message.
//!
//! Callers tag structured messages with where they come from, packed in one string:
//!
//! ```text
//! package:Struct.method#section!action
//! ```
//!
//! Only the package is mandatory and it is recognised by its `:`. Without a `:` nothing is
//! extracted. After it, each delimiter is looked up once, left to right, and everything past
//! the first occurrence belongs to the next component:
//!
//! | type                           | labels                                               |
//! |--------------------------------|------------------------------------------------------|
//! | `db:Pool.get#acquire!timeout`  | package, class, method, section and action           |
//! | `db:get!timeout`               | package, method and action                           |
//! | `db:Pool.get`                  | package, class and method                            |
//! | `Pool.get`                     | none                                                 |

use std::collections::HashMap;

pub const LOG_PACKAGE: &str = "log_package";
pub const LOG_CLASS: &str = "log_class";
pub const LOG_METHOD: &str = "log_method";
pub const LOG_SECTION: &str = "log_section";
pub const LOG_ACTION: &str = "log_action";

/// The payload key holding the type string.
pub const TYPE_KEY: &str = "type";

/// The components of a type string. Empty components are kept as empty strings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeLabels {
    pub package: String,
    pub class: Option<String>,
    pub method: String,
    pub section: Option<String>,
    pub action: Option<String>,
}

impl TypeLabels {
    /// Parses a type string, returning `None` when it has no package delimiter.
    pub fn parse(type_str: &str) -> Option<TypeLabels> {
        let (package, remaining) = type_str.split_once(':')?;

        let mut labels = TypeLabels {
            package: package.to_string(),
            ..Default::default()
        };

        let class_method = match remaining.split_once('#') {
            Some((class_method, section_action)) => {
                match section_action.split_once('!') {
                    Some((section, action)) => {
                        labels.section = Some(section.to_string());
                        labels.action = Some(action.to_string());
                    }
                    None => labels.section = Some(section_action.to_string()),
                }
                class_method
            }
            None => match remaining.split_once('!') {
                Some((class_method, action)) => {
                    labels.action = Some(action.to_string());
                    class_method
                }
                None => remaining,
            },
        };

        match class_method.split_once('.') {
            Some((class, method)) => {
                labels.class = Some(class.to_string());
                labels.method = method.to_string();
            }
            None => labels.method = class_method.to_string(),
        }

        Some(labels)
    }

    /// Reads the type string from a decoded message payload. Absent or non-string values
    /// yield `None`.
    pub fn from_payload(payload: &serde_json::Map<String, serde_json::Value>) -> Option<TypeLabels> {
        payload
            .get(TYPE_KEY)
            .and_then(serde_json::Value::as_str)
            .and_then(TypeLabels::parse)
    }

    /// Adds the `log_*` labels, skipping components that were not present.
    pub fn apply(self, labels: &mut HashMap<String, String>) {
        labels.insert(LOG_PACKAGE.to_string(), self.package);
        if let Some(class) = self.class {
            labels.insert(LOG_CLASS.to_string(), class);
        }
        labels.insert(LOG_METHOD.to_string(), self.method);
        if let Some(section) = self.section {
            labels.insert(LOG_SECTION.to_string(), section);
        }
        if let Some(action) = self.action {
            labels.insert(LOG_ACTION.to_string(), action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TypeLabels;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;

    fn labels_of(type_str: &str) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        if let Some(parsed) = TypeLabels::parse(type_str) {
            parsed.apply(&mut labels);
        }
        labels
    }

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn all_components() {
        assert_eq!(
            labels_of("pkg:Struct.Method#Section!Action"),
            map(&[
                ("log_package", "pkg"),
                ("log_class", "Struct"),
                ("log_method", "Method"),
                ("log_section", "Section"),
                ("log_action", "Action"),
            ])
        );
    }

    #[test]
    fn method_and_action() {
        assert_eq!(
            labels_of("pkg:Method!Action"),
            map(&[
                ("log_package", "pkg"),
                ("log_method", "Method"),
                ("log_action", "Action"),
            ])
        );
    }

    #[test]
    fn class_and_method() {
        assert_eq!(
            labels_of("pkg:Struct.Method"),
            map(&[
                ("log_package", "pkg"),
                ("log_class", "Struct"),
                ("log_method", "Method"),
            ])
        );
    }

    #[test]
    fn method_and_section() {
        assert_eq!(
            labels_of("pkg:Method#Section"),
            map(&[
                ("log_package", "pkg"),
                ("log_method", "Method"),
                ("log_section", "Section"),
            ])
        );
    }

    #[test]
    fn class_method_and_action() {
        assert_eq!(
            labels_of("pkg:Struct.Method!Action"),
            map(&[
                ("log_package", "pkg"),
                ("log_class", "Struct"),
                ("log_method", "Method"),
                ("log_action", "Action"),
            ])
        );
    }

    #[test]
    fn no_package_delimiter_means_no_labels() {
        assert!(labels_of("Struct.Method#Section!Action").is_empty());
        assert!(labels_of("ijsType").is_empty());
        assert!(labels_of("").is_empty());
    }

    #[test]
    fn empty_components_are_kept() {
        assert_eq!(
            labels_of(":"),
            map(&[("log_package", ""), ("log_method", "")])
        );
        assert_eq!(
            labels_of(":#!"),
            map(&[
                ("log_package", ""),
                ("log_method", ""),
                ("log_section", ""),
                ("log_action", ""),
            ])
        );
    }

    #[test]
    fn first_occurrence_of_each_delimiter_wins() {
        assert_eq!(
            labels_of("a:b:c.d.e#f#g!h!i"),
            map(&[
                ("log_package", "a"),
                ("log_class", "b:c"),
                ("log_method", "d.e"),
                ("log_section", "f#g"),
                ("log_action", "h!i"),
            ])
        );
    }

    #[test]
    fn bang_before_hash_is_part_of_the_method() {
        // '#' is looked for first, so a '!' in front of it stays in the method
        assert_eq!(
            labels_of("pkg:Method!x#Section"),
            map(&[
                ("log_package", "pkg"),
                ("log_method", "Method!x"),
                ("log_section", "Section"),
            ])
        );
    }

    #[test]
    fn reads_type_from_payload() {
        let payload = json!({"type": "pkg:Struct.Method", "data": 1});
        let parsed = TypeLabels::from_payload(payload.as_object().unwrap()).unwrap();
        assert_eq!(parsed.class.as_deref(), Some("Struct"));

        let not_a_string = json!({"type": 12});
        assert_eq!(TypeLabels::from_payload(not_a_string.as_object().unwrap()), None);

        let absent = json!({"kind": "pkg:Method"});
        assert_eq!(TypeLabels::from_payload(absent.as_object().unwrap()), None);
    }
}
