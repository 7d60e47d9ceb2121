//! Placeholder token scanning.
//!
//! Two token families appear in statement text:
//!
//! - `${name}` — textual substitution at tree-evaluation time, against the
//!   context's variables. Unresolved tokens are left verbatim.
//! - `#{property}` — positional parameter, replaced by a `?` marker with an
//!   ordered binding descriptor. Attributes follow the property, comma
//!   separated: `#{count,mode=OUT,type=BIGINT}`.

use regex::{Captures, Regex};
use sqlmapper_core::error::{Error, Result, ScriptError, ScriptErrorKind};
use sqlmapper_core::{ParameterBinding, ParameterMode, SqlType};
use std::sync::OnceLock;

fn dollar_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").expect("valid pattern"))
}

fn hash_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#\{([^}]*)\}").expect("valid pattern"))
}

/// Substitute `${name}` tokens via the given lookup.
///
/// Tokens the lookup cannot resolve stay in the text verbatim.
pub fn replace_dollar_tokens<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    dollar_token()
        .replace_all(text, |caps: &Captures<'_>| {
            lookup(caps[1].trim()).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Replace every `#{...}` token with a positional `?` marker, collecting
/// the ordered binding descriptors left to right.
pub fn parse_placeholders(sql: &str) -> Result<(String, Vec<ParameterBinding>)> {
    let mut bindings = Vec::new();
    let mut first_error: Option<Error> = None;
    let replaced = hash_token().replace_all(sql, |caps: &Captures<'_>| {
        match parse_binding(caps[1].trim()) {
            Ok(binding) => bindings.push(binding),
            Err(error) => {
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
        "?".to_string()
    });
    if let Some(error) = first_error {
        return Err(error);
    }
    Ok((replaced.into_owned(), bindings))
}

fn parse_binding(content: &str) -> Result<ParameterBinding> {
    let mut parts = content.split(',');
    let property = parts.next().unwrap_or("").trim();
    if property.is_empty() {
        return Err(placeholder_error(content, "missing property name"));
    }
    let mut binding = ParameterBinding::new(property);
    for attr in parts {
        let Some((name, value)) = attr.split_once('=') else {
            return Err(placeholder_error(content, "attribute is not name=value"));
        };
        match name.trim() {
            "mode" => {
                binding = binding.mode(match value.trim().to_ascii_uppercase().as_str() {
                    "IN" => ParameterMode::In,
                    "OUT" => ParameterMode::Out,
                    "INOUT" => ParameterMode::InOut,
                    other => {
                        return Err(placeholder_error(
                            content,
                            &format!("unknown parameter mode '{other}'"),
                        ));
                    }
                });
            }
            "type" => {
                let sql_type = SqlType::from_name(value.trim()).ok_or_else(|| {
                    placeholder_error(content, &format!("unknown type '{}'", value.trim()))
                })?;
                binding = binding.sql_type(sql_type);
            }
            other => {
                return Err(placeholder_error(
                    content,
                    &format!("unknown attribute '{other}'"),
                ));
            }
        }
    }
    Ok(binding)
}

fn placeholder_error(content: &str, detail: &str) -> Error {
    Error::Script(ScriptError::new(
        ScriptErrorKind::Placeholder,
        format!("malformed placeholder '#{{{content}}}': {detail}"),
    ))
}

/// Rewrite `#{...}` tokens whose property root is `from` to use `to`.
///
/// Iteration nodes use this to point each repetition's placeholders at the
/// synthetic, counter-suffixed binding for that pass.
pub fn rewrite_placeholder_roots(text: &str, from: &str, to: &str) -> String {
    hash_token()
        .replace_all(text, |caps: &Captures<'_>| {
            let content = caps[1].trim();
            let (property, attrs) = match content.find(',') {
                Some(pos) => (&content[..pos], &content[pos..]),
                None => (content, ""),
            };
            let property = property.trim_end();
            let rewritten = if property == from {
                to.to_string()
            } else if property.starts_with(from)
                && matches!(property.as_bytes().get(from.len()), Some(b'.' | b'['))
            {
                format!("{to}{}", &property[from.len()..])
            } else {
                return caps[0].to_string();
            };
            format!("#{{{rewritten}{attrs}}}")
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_substitution_leaves_unresolved_tokens() {
        let out = replace_dollar_tokens("ORDER BY ${col} ${dir}", |name| {
            (name == "col").then(|| "name".to_string())
        });
        assert_eq!(out, "ORDER BY name ${dir}");
    }

    #[test]
    fn placeholders_become_positional_markers() {
        let (sql, bindings) =
            parse_placeholders("SELECT * FROM users WHERE id = #{id} AND name = #{user.name}")
                .unwrap();
        assert_eq!(sql, "SELECT * FROM users WHERE id = ? AND name = ?");
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].property(), "id");
        assert_eq!(bindings[1].property(), "user.name");
    }

    #[test]
    fn placeholder_attributes() {
        let (sql, bindings) =
            parse_placeholders("CALL count_rows(#{table}, #{count,mode=OUT,type=BIGINT})").unwrap();
        assert_eq!(sql, "CALL count_rows(?, ?)");
        assert_eq!(bindings[1].parameter_mode(), ParameterMode::Out);
        assert_eq!(bindings[1].declared_type(), Some(SqlType::BigInt));
    }

    #[test]
    fn malformed_placeholders_are_reported() {
        assert!(parse_placeholders("WHERE id = #{}").is_err());
        assert!(parse_placeholders("WHERE id = #{id,mode=SIDEWAYS}").is_err());
        assert!(parse_placeholders("WHERE id = #{id,nope=1}").is_err());
        assert!(parse_placeholders("WHERE id = #{id,type=PICTURE}").is_err());
    }

    #[test]
    fn root_rewrites_respect_boundaries() {
        let out = rewrite_placeholder_roots("#{item} #{item.id} #{items} #{x,type=INT}", "item", "item_0");
        assert_eq!(out, "#{item_0} #{item_0.id} #{items} #{x,type=INT}");

        let out = rewrite_placeholder_roots("#{it[0]} #{it.id,type=INT}", "it", "it_2");
        assert_eq!(out, "#{it_2[0]} #{it_2.id,type=INT}");
    }
}
