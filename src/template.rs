//! Command template expansion.
//!
//! Templates are plain strings with `{NAME}` placeholders resolved against
//! the environment built for the invocation. The closed grammar is
//! substitution only: no arithmetic, no control flow, and the result is
//! never handed to a shell, so shell metacharacters are inert.
//!
//! Tokenization happens first: the template is split on whitespace, with
//! single and double quotes grouping. Each token then becomes exactly one
//! argument after substitution, so a variable whose value contains spaces
//! still yields a single argument. `{{` and `}}` produce literal braces.

use std::collections::BTreeMap;

use crate::errors::CollectError;

/// Expand a command template into an argument vector.
///
/// Fails with [`CollectError::UndefinedVariable`] when a placeholder names
/// a variable absent from `env` (never silently emptied), and with
/// [`CollectError::EmptyCommand`] when the template contains no token at
/// all. An absent template is the caller's concern; by the time this
/// function runs there is a command to expand.
pub fn expand_command(
    template: &str,
    env: &BTreeMap<String, String>,
) -> Result<Vec<String>, CollectError> {
    let tokens = tokenize(template).map_err(|reason| CollectError::Template {
        template: template.to_string(),
        reason,
    })?;

    if tokens.is_empty() {
        return Err(CollectError::EmptyCommand {
            template: template.to_string(),
        });
    }

    tokens
        .iter()
        .map(|token| expand_token(token, template, env))
        .collect()
}

/// Validate a template's syntax without an environment.
///
/// Used by the configuration validation pass so that unbalanced quotes or
/// braces abort the run before any command executes.
pub fn check_template(template: &str) -> Result<(), String> {
    let tokens = tokenize(template)?;
    for token in &tokens {
        scan_placeholders(token, |_| Some(String::new())).map_err(|name| match name {
            Some(name) => format!("unterminated placeholder {{{name}"),
            None => "empty placeholder {}".to_string(),
        })?;
    }
    Ok(())
}

/// Split on whitespace honoring single and double quotes. Quote characters
/// group but are not part of the token. No backslash escaping.
fn tokenize(template: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in template.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_token = true;
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }

    if let Some(q) = quote {
        return Err(format!("unbalanced {q} quote"));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn expand_token(
    token: &str,
    template: &str,
    env: &BTreeMap<String, String>,
) -> Result<String, CollectError> {
    scan_placeholders(token, |name| env.get(name).cloned()).map_err(|name| match name {
        Some(name) => CollectError::UndefinedVariable {
            name,
            template: template.to_string(),
        },
        None => CollectError::Template {
            template: template.to_string(),
            reason: "empty placeholder {}".to_string(),
        },
    })
}

/// Walk `token` replacing each `{NAME}` via `resolve`. On failure, returns
/// `Some(name)` for an unresolvable or unterminated placeholder and `None`
/// for an empty one.
fn scan_placeholders<F>(token: &str, resolve: F) -> Result<String, Option<String>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(Some(name));
                }
                if name.is_empty() {
                    return Err(None);
                }
                match resolve(&name) {
                    Some(value) => out.push_str(&value),
                    None => return Err(Some(name)),
                }
            }
            '}' => {
                // Tolerate both `}}` and a stray closing brace as literals.
                if chars.peek() == Some(&'}') {
                    chars.next();
                }
                out.push('}');
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_simple_expansion() {
        let env = env(&[("DIR", "/tmp/work"), ("ROOT", "/data")]);
        let argv = expand_command("prog -o {DIR} --root {ROOT}", &env).unwrap();
        assert_eq!(argv, ["prog", "-o", "/tmp/work", "--root", "/data"]);
    }

    #[test]
    fn test_placeholder_inside_token() {
        let env = env(&[("CONFIG_DIR", "/conf")]);
        let argv = expand_command("import {CONFIG_DIR}/tsme.yml", &env).unwrap();
        assert_eq!(argv, ["import", "/conf/tsme.yml"]);
    }

    #[test]
    fn test_value_with_spaces_stays_one_argument() {
        let env = env(&[("MSG", "hello world")]);
        let argv = expand_command("announce {MSG}", &env).unwrap();
        assert_eq!(argv, ["announce", "hello world"]);
    }

    #[test]
    fn test_undefined_variable_fails_before_launch() {
        let err = expand_command("prog {UNKNOWN}", &env(&[])).unwrap_err();
        match err {
            CollectError::UndefinedVariable { name, .. } => assert_eq!(name, "UNKNOWN"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_quoted_arguments() {
        let env = env(&[("F", "/data/x")]);
        let argv = expand_command(r#"prog "two words" '{F}'"#, &env).unwrap();
        assert_eq!(argv, ["prog", "two words", "/data/x"]);
    }

    #[test]
    fn test_shell_metacharacters_are_inert() {
        let argv = expand_command("prog a.csv > out.txt && rm -rf /", &env(&[])).unwrap();
        assert_eq!(argv, ["prog", "a.csv", ">", "out.txt", "&&", "rm", "-rf", "/"]);
    }

    #[test]
    fn test_escaped_braces() {
        let argv = expand_command("prog {{literal}}", &env(&[])).unwrap();
        assert_eq!(argv, ["prog", "{literal}"]);
    }

    #[test]
    fn test_empty_template_is_empty_command() {
        assert!(matches!(
            expand_command("   ", &env(&[])),
            Err(CollectError::EmptyCommand { .. })
        ));
    }

    #[test]
    fn test_check_template() {
        assert!(check_template("prog -o {DIR}").is_ok());
        assert!(check_template("prog {DIR").is_err());
        assert!(check_template("prog {}").is_err());
        assert!(check_template(r#"prog "unclosed"#).is_err());
    }
}
