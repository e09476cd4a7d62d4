use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use crate::dataset::{MalformedLine, Record, SharedDataset};
use crate::error::{Error, Result};
use crate::schema::{LoadMode, Schema};

/// Parses delimited text into a [`SharedDataset`].
///
/// One record per line, fields separated by the schema delimiter and trimmed. Blank lines
/// are ignored. Lines with the wrong number of fields or unparseable numeric fields are
/// malformed: skipped with a warning in [`LoadMode::Lenient`], fatal in [`LoadMode::Strict`].
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    schema: Schema,
    mode: LoadMode,
}

impl DatasetLoader {
    pub fn new(schema: Schema, mode: LoadMode) -> Self {
        Self { schema, mode }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    pub async fn load_path(&self, path: &Path) -> Result<SharedDataset> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| Error::Read {
                path: path.to_path_buf(),
                source,
            })?;
        self.load_str(&path.display().to_string(), &text)
    }

    pub fn load_reader<R: BufRead>(&self, source: &str, reader: R) -> Result<SharedDataset> {
        let mut parser = Parser::new(self);
        for (idx, line) in reader.lines().enumerate() {
            parser.line(idx + 1, &line?)?;
        }
        parser.finish(source)
    }

    pub fn load_str(&self, source: &str, input: &str) -> Result<SharedDataset> {
        let mut parser = Parser::new(self);
        for (idx, line) in input.lines().enumerate() {
            parser.line(idx + 1, line)?;
        }
        parser.finish(source)
    }
}

struct Parser<'a> {
    loader: &'a DatasetLoader,
    names: Arc<[Arc<str>]>,
    records: Vec<Record>,
    skipped: Vec<MalformedLine>,
}

impl<'a> Parser<'a> {
    fn new(loader: &'a DatasetLoader) -> Self {
        Self {
            loader,
            names: loader.schema.field_names(),
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }

    fn line(&mut self, line_no: usize, raw: &str) -> Result<()> {
        let raw = raw.trim_end_matches('\r');
        if raw.trim().is_empty() {
            return Ok(());
        }

        match self.parse_fields(raw) {
            Ok(values) => {
                self.records
                    .push(Record::new(self.names.clone(), values, line_no));
                Ok(())
            }
            Err(reason) => match self.loader.mode {
                LoadMode::Strict => Err(Error::Malformed {
                    line: line_no,
                    reason,
                }),
                LoadMode::Lenient => {
                    log::warn!("skipping malformed dataset line {line_no}: {reason}");
                    self.skipped.push(MalformedLine {
                        line: line_no,
                        reason,
                    });
                    Ok(())
                }
            },
        }
    }

    fn parse_fields(&self, raw: &str) -> std::result::Result<Box<[swarmr_value::Value]>, String> {
        let schema = &self.loader.schema;
        let parts: Vec<&str> = raw.split(schema.delimiter).map(str::trim).collect();
        if parts.len() != schema.fields.len() {
            return Err(format!(
                "expected {} fields separated by `{}`, found {}",
                schema.fields.len(),
                schema.delimiter,
                parts.len()
            ));
        }

        schema
            .fields
            .iter()
            .zip(parts)
            .map(|(spec, part)| {
                spec.kind
                    .parse(part)
                    .map_err(|e| format!("field `{}`: {e}", spec.name))
            })
            .collect()
    }

    fn finish(self, source: &str) -> Result<SharedDataset> {
        if !self.skipped.is_empty() {
            log::warn!(
                "dataset `{source}`: {} records loaded, {} malformed lines skipped",
                self.records.len(),
                self.skipped.len()
            );
        }
        SharedDataset::new(source, self.records, self.skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSpec};
    use swarmr_value::Value;

    fn instructors_schema() -> Schema {
        Schema::new(
            '|',
            vec![
                FieldSpec::text("nombre"),
                FieldSpec::text("correo"),
                FieldSpec::text("institucion"),
            ],
        )
        .unwrap_or_else(|e| panic!("{e}"))
    }

    const INPUT: &str = "Ana Perez | ana@uni.edu | UNAL\n\
        \n\
        broken line without delimiters\n\
        Luis Gomez|luis@uni.edu|UdeA\r\n";

    #[test]
    fn lenient_skips_and_counts_malformed_lines() {
        let loader = DatasetLoader::new(instructors_schema(), LoadMode::Lenient);
        let ds = loader
            .load_str("instructores.txt", INPUT)
            .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(ds.len(), 2);
        assert_eq!(ds.skipped().len(), 1);
        assert_eq!(ds.skipped()[0].line, 3);
        assert_eq!(ds.records()[0].text("correo"), Some("ana@uni.edu"));
        assert_eq!(ds.records()[1].text("institucion"), Some("UdeA"));
        assert_eq!(ds.records()[1].line(), 4);
    }

    #[test]
    fn strict_fails_on_first_malformed_line() {
        let loader = DatasetLoader::new(instructors_schema(), LoadMode::Strict);
        let err = match loader.load_str("instructores.txt", INPUT) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::Malformed { line: 3, .. }), "{err}");
    }

    #[test]
    fn numeric_fields_reject_nan_and_overflow() {
        let schema = Schema::new(
            ',',
            vec![
                FieldSpec::text("name"),
                FieldSpec::new("age", FieldKind::Integer),
                FieldSpec::new("score", FieldKind::Float),
            ],
        )
        .unwrap_or_else(|e| panic!("{e}"));

        let input = "a,30,1.5\nb,99999999999999999999,2\nc,40,NaN\nd,50,3";
        let ds = DatasetLoader::new(schema.clone(), LoadMode::Lenient)
            .load_str("people.csv", input)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.records()[1].get("age"), Some(&Value::I64(50)));
        assert_eq!(
            ds.skipped().iter().map(|m| m.line).collect::<Vec<_>>(),
            vec![2, 3]
        );

        let strict = DatasetLoader::new(schema, LoadMode::Strict).load_str("people.csv", input);
        assert!(matches!(strict, Err(Error::Malformed { line: 2, .. })));
    }

    #[test]
    fn all_lines_malformed_is_an_empty_dataset_error() {
        let loader = DatasetLoader::new(instructors_schema(), LoadMode::Lenient);
        let err = match loader.load_str("bad.txt", "nope\n\nstill nope\n") {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::Empty { skipped: 2, .. }), "{err}");
    }

    #[test]
    fn reader_and_str_agree() {
        let loader = DatasetLoader::new(instructors_schema(), LoadMode::Lenient);
        let a = loader
            .load_str("a", INPUT)
            .unwrap_or_else(|e| panic!("{e}"));
        let b = loader
            .load_reader("b", std::io::Cursor::new(INPUT))
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(a.records(), b.records());
    }
}
