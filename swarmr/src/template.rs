use std::collections::BTreeMap;
use std::fmt::Write as _;

use swarmr_core::{IterationContext, Record};
use swarmr_data::Schema;

const VU_PLACEHOLDER: &str = "__vu";
const ITER_PLACEHOLDER: &str = "__iter";

/// Replaces every `${NAME}` with its value from `env`. Unknown names are an error.
pub(crate) fn expand_env(input: &str, env: &BTreeMap<String, String>) -> anyhow::Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| anyhow::anyhow!("unterminated `${{` in `{input}`"))?;
        let name = after[..end].trim();
        if name.is_empty() {
            anyhow::bail!("empty `${{}}` in `{input}`");
        }
        let value = env
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("environment variable `{name}` is not set"))?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
    Vu,
    Iter,
}

/// How dataset values are written into the rendered string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldEncoding {
    Raw,
    /// `application/x-www-form-urlencoded`, so `Ana Perez` becomes `Ana+Perez`.
    UrlComponent,
}

/// A string with `{{...}}` placeholders, compiled once at plan load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Template {
    segments: Vec<Segment>,
    encoding: FieldEncoding,
}

impl Template {
    /// Field placeholders are checked against `schema`; without a dataset only `{{__vu}}`
    /// and `{{__iter}}` are allowed.
    pub(crate) fn parse(input: &str, schema: Option<&Schema>) -> anyhow::Result<Self> {
        let segments = parse_segments(input, schema)?;
        Ok(Self {
            segments,
            encoding: FieldEncoding::Raw,
        })
    }

    /// Like [`Template::parse`], but dataset values are percent-encoded when rendered.
    /// Literal text is left alone.
    pub(crate) fn parse_url(input: &str, schema: Option<&Schema>) -> anyhow::Result<Self> {
        let segments = parse_segments(input, schema)?;
        Ok(Self {
            segments,
            encoding: FieldEncoding::UrlComponent,
        })
    }

    pub(crate) fn render(&self, ctx: &IterationContext) -> String {
        self.render_with(ctx.vu_id(), ctx.iteration(), ctx.record())
    }

    fn render_with(&self, vu: u64, iteration: u64, record: Option<&Record>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Vu => {
                    let _ = write!(out, "{vu}");
                }
                Segment::Iter => {
                    let _ = write!(out, "{iteration}");
                }
                Segment::Field(name) => {
                    let Some(v) = record.and_then(|r| r.get(name)) else {
                        continue;
                    };
                    match self.encoding {
                        FieldEncoding::Raw => {
                            let _ = write!(out, "{v}");
                        }
                        FieldEncoding::UrlComponent => {
                            let raw = v.to_string();
                            out.extend(url::form_urlencoded::byte_serialize(raw.as_bytes()));
                        }
                    }
                }
            }
        }
        out
    }
}

fn parse_segments(input: &str, schema: Option<&Schema>) -> anyhow::Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            segments.push(Segment::Literal(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| anyhow::anyhow!("unterminated `{{{{` in `{input}`"))?;
        let name = after[..end].trim();

        let segment = match name {
            VU_PLACEHOLDER => Segment::Vu,
            ITER_PLACEHOLDER => Segment::Iter,
            "" => anyhow::bail!("empty `{{{{}}}}` in `{input}`"),
            field => match schema {
                Some(schema) if schema.has_field(field) => Segment::Field(field.to_string()),
                Some(_) => anyhow::bail!("`{{{{{field}}}}}` is not a dataset field"),
                None => anyhow::bail!("`{{{{{field}}}}}` needs a dataset, but the plan has none"),
            },
        };
        segments.push(segment);
        rest = &after[end + 2..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmr_data::{DatasetLoader, FieldKind, FieldSpec, LoadMode};

    fn env() -> BTreeMap<String, String> {
        [("BASE_URL", "http://localhost:8080"), ("TOKEN", "abc")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn schema() -> Schema {
        Schema::new(
            ',',
            vec![
                FieldSpec::text("courseId"),
                FieldSpec::new("seats", FieldKind::Integer),
            ],
        )
        .unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn env_placeholders_are_expanded() {
        let out = expand_env("${BASE_URL}/webapi/courses?t=${ TOKEN }", &env())
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(out, "http://localhost:8080/webapi/courses?t=abc");
    }

    #[test]
    fn missing_env_var_is_an_error() {
        let err = match expand_env("${NOPE}/x", &env()) {
            Ok(v) => panic!("expected error, got {v}"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("NOPE"), "{err}");
        assert!(expand_env("${BASE_URL", &env()).is_err());
    }

    #[test]
    fn record_fields_and_iteration_placeholders_render() {
        let schema = schema();
        let dataset = DatasetLoader::new(schema.clone(), LoadMode::Strict)
            .load_str("courses", "CS101,30\nCS102,40")
            .unwrap_or_else(|e| panic!("{e}"));

        let tpl = Template::parse(
            "/webapi/course/archive?courseid={{ courseId }}&seats={{seats}}&vu={{__vu}}&i={{__iter}}",
            Some(&schema),
        )
        .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(
            tpl.render_with(3, 7, dataset.get(1)),
            "/webapi/course/archive?courseid=CS102&seats=40&vu=3&i=7"
        );
    }

    #[test]
    fn unknown_fields_are_rejected_at_load() {
        let schema = schema();
        assert!(Template::parse("{{studentEmail}}", Some(&schema)).is_err());
        assert!(Template::parse("{{courseId}}", None).is_err());
        assert!(Template::parse("{{courseId", Some(&schema)).is_err());

        let plain = Template::parse("no placeholders", None).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(plain.render_with(1, 0, None), "no placeholders");
    }

    #[test]
    fn url_templates_percent_encode_record_values() {
        let schema = Schema::new(',', vec![FieldSpec::text("nombre")])
            .unwrap_or_else(|e| panic!("{e}"));
        let dataset = DatasetLoader::new(schema.clone(), LoadMode::Strict)
            .load_str("instructors", "Ana Perez+1")
            .unwrap_or_else(|e| panic!("{e}"));
        let record = dataset.get(0);

        let url = Template::parse_url(
            "/webapi/courses?instructorname={{nombre}}&vu={{__vu}}",
            Some(&schema),
        )
        .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            url.render_with(2, 0, record),
            "/webapi/courses?instructorname=Ana+Perez%2B1&vu=2"
        );

        let body = Template::parse(r#"{"name": "{{nombre}}"}"#, Some(&schema))
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(body.render_with(2, 0, record), r#"{"name": "Ana Perez+1"}"#);
    }
}
