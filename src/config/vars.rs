//! Environment variable interpolation for config files.
//!
//! Supported references:
//! - `$VAR` or `${VAR}`: the variable's value, an error if unset
//! - `${VAR:-fallback}`: fallback when VAR is unset or empty
//! - `${VAR-fallback}`: fallback only when VAR is unset
//! - `$$`: a literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$
        |
        \$\{
            (?P<braced>[A-Za-z_][A-Za-z0-9_]*)
            (?: (?P<op>:?-) (?P<fallback>[^}]*) )?
        \}
        |
        \$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("valid interpolation pattern")
});

/// How a missing or empty variable is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback<'a> {
    Required,
    IfUnset(&'a str),
    IfUnsetOrEmpty(&'a str),
}

impl<'a> Fallback<'a> {
    fn from_captures(caps: &Captures<'a>) -> Self {
        let value = caps.name("fallback").map_or("", |m| m.as_str());
        match caps.name("op").map(|m| m.as_str()) {
            Some(":-") => Fallback::IfUnsetOrEmpty(value),
            Some(_) => Fallback::IfUnset(value),
            None => Fallback::Required,
        }
    }
}

fn resolve(name: &str, fallback: Fallback<'_>) -> Result<String, String> {
    match (env::var(name), fallback) {
        (Ok(value), _) if value.contains(['\n', '\r']) => Err(format!(
            "environment variable '{name}' contains newlines, which is not allowed"
        )),
        (Ok(value), Fallback::IfUnsetOrEmpty(fallback)) if value.is_empty() => {
            Ok(fallback.to_string())
        }
        (Ok(value), _) => Ok(value),
        (Err(_), Fallback::IfUnset(fallback) | Fallback::IfUnsetOrEmpty(fallback)) => {
            Ok(fallback.to_string())
        }
        (Err(_), Fallback::Required) => Err(format!("environment variable '{name}' is not set")),
    }
}

/// Interpolate environment variables in `input`.
///
/// Every unresolvable reference is reported, so a config with several
/// missing variables fails once with the full list.
pub fn interpolate(input: &str) -> Result<String, Vec<String>> {
    let mut errors = Vec::new();

    let text = REFERENCE.replace_all(input, |caps: &Captures| {
        let whole = caps.get(0).map_or("", |m| m.as_str());
        let Some(name) = caps.name("braced").or_else(|| caps.name("bare")) else {
            return "$".to_string();
        };
        match resolve(name.as_str(), Fallback::from_captures(caps)) {
            Ok(value) => value,
            Err(e) => {
                errors.push(e);
                whole.to_string()
            }
        }
    });

    if errors.is_empty() {
        Ok(text.into_owned())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        // SAFETY: every test uses its own variable names
        for (key, value) in vars {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        let result = f();

        // SAFETY: restores the values captured above
        for (key, original) in originals {
            match original {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    #[test]
    fn test_bare_and_braced() {
        with_env_vars(
            &[
                ("FS_TO_BQ_TEST_BARE", Some("alpha")),
                ("FS_TO_BQ_TEST_BRACED", Some("beta")),
            ],
            || {
                let text = interpolate("a: $FS_TO_BQ_TEST_BARE b: ${FS_TO_BQ_TEST_BRACED}").unwrap();
                assert_eq!(text, "a: alpha b: beta");
            },
        );
    }

    #[test]
    fn test_missing_variables_are_all_reported() {
        with_env_vars(
            &[("FS_TO_BQ_TEST_MISS1", None), ("FS_TO_BQ_TEST_MISS2", None)],
            || {
                let errors = interpolate("$FS_TO_BQ_TEST_MISS1 ${FS_TO_BQ_TEST_MISS2}").unwrap_err();
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("FS_TO_BQ_TEST_MISS1"));
                assert!(errors[1].contains("not set"));
            },
        );
    }

    #[test]
    fn test_fallbacks() {
        with_env_vars(
            &[
                ("FS_TO_BQ_TEST_UNSET", None),
                ("FS_TO_BQ_TEST_EMPTY", Some("")),
                ("FS_TO_BQ_TEST_SET", Some("actual")),
            ],
            || {
                assert_eq!(interpolate("${FS_TO_BQ_TEST_UNSET:-x}").unwrap(), "x");
                assert_eq!(interpolate("${FS_TO_BQ_TEST_UNSET-x}").unwrap(), "x");
                assert_eq!(interpolate("${FS_TO_BQ_TEST_EMPTY:-x}").unwrap(), "x");
                assert_eq!(interpolate("${FS_TO_BQ_TEST_EMPTY-x}").unwrap(), "");
                assert_eq!(interpolate("${FS_TO_BQ_TEST_SET:-x}").unwrap(), "actual");
            },
        );
    }

    #[test]
    fn test_dollar_escape() {
        assert_eq!(interpolate("cost: $$5").unwrap(), "cost: $5");
    }

    #[test]
    fn test_newlines_rejected() {
        with_env_vars(&[("FS_TO_BQ_TEST_NL", Some("a\nb"))], || {
            let errors = interpolate("$FS_TO_BQ_TEST_NL").unwrap_err();
            assert!(errors[0].contains("newlines"));
        });
    }

    #[test]
    fn test_config_example() {
        with_env_vars(
            &[
                ("FS_TO_BQ_TEST_PROJECT", Some("acme-prod")),
                ("FS_TO_BQ_TEST_DATASET_LOCATION", None),
            ],
            || {
                let yaml = r#"
params:
  project_id: ${FS_TO_BQ_TEST_PROJECT}
  dataset_location: ${FS_TO_BQ_TEST_DATASET_LOCATION:-eu}
"#;
                let text = interpolate(yaml).unwrap();
                assert!(text.contains("project_id: acme-prod"));
                assert!(text.contains("dataset_location: eu"));
            },
        );
    }
}
