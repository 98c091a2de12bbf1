//! A push-style JSON generator over `serde_json`'s formatters.

use crate::error::{Error, Result};
use serde_json::ser::{CompactFormatter, Formatter, PrettyFormatter};
use std::io;

/// Compact or indented layout, picked at runtime
#[derive(Debug)]
pub enum Layout {
    /// No whitespace
    Compact(CompactFormatter),
    /// Two-space indentation
    Pretty(PrettyFormatter<'static>),
}

macro_rules! delegate_layout {
    ($($name:ident($($arg:ident: $ty:ty),*);)*) => {
        $(
            fn $name<W>(&mut self, writer: &mut W $(, $arg: $ty)*) -> io::Result<()>
            where
                W: ?Sized + io::Write,
            {
                match self {
                    Layout::Compact(f) => f.$name(writer $(, $arg)*),
                    Layout::Pretty(f) => f.$name(writer $(, $arg)*),
                }
            }
        )*
    };
}

impl Formatter for Layout {
    delegate_layout! {
        begin_array();
        end_array();
        begin_array_value(first: bool);
        end_array_value();
        begin_object();
        end_object();
        begin_object_key(first: bool);
        end_object_key();
        begin_object_value();
        end_object_value();
    }
}

#[derive(Debug)]
enum Scope {
    Object { first: bool },
    Array { first: bool },
}

/// Writes JSON tokens one call at a time.
///
/// Layout is delegated to a [`Formatter`], so the same calls produce compact
/// or indented output. String escaping goes through `serde_json`.
#[derive(Debug)]
pub struct JsonGenerator<F = CompactFormatter> {
    out: Vec<u8>,
    formatter: F,
    scopes: Vec<Scope>,
}

impl JsonGenerator<CompactFormatter> {
    /// A generator producing compact output
    pub fn compact() -> Self {
        Self::with_formatter(CompactFormatter)
    }
}

impl JsonGenerator<PrettyFormatter<'static>> {
    /// A generator producing output indented by two spaces
    pub fn pretty() -> Self {
        Self::with_formatter(PrettyFormatter::new())
    }
}

impl JsonGenerator<Layout> {
    /// A generator whose layout is chosen at runtime
    pub fn with_layout(pretty: bool) -> Self {
        Self::with_formatter(if pretty {
            Layout::Pretty(PrettyFormatter::new())
        } else {
            Layout::Compact(CompactFormatter)
        })
    }
}

impl<F: Formatter> JsonGenerator<F> {
    /// A generator using `formatter` for layout
    pub fn with_formatter(formatter: F) -> Self {
        Self {
            out: Vec::new(),
            formatter,
            scopes: Vec::new(),
        }
    }

    /// Opens an object
    pub fn begin_object(&mut self) -> Result<()> {
        self.begin_value()?;
        self.formatter.begin_object(&mut self.out)?;
        self.scopes.push(Scope::Object { first: true });
        Ok(())
    }

    /// Closes the innermost object
    pub fn end_object(&mut self) -> Result<()> {
        match self.scopes.pop() {
            Some(Scope::Object { .. }) => {
                self.formatter.end_object(&mut self.out)?;
                self.end_value()
            }
            _ => Err(Error::internal("end_object outside of an object")),
        }
    }

    /// Opens an array
    pub fn begin_array(&mut self) -> Result<()> {
        self.begin_value()?;
        self.formatter.begin_array(&mut self.out)?;
        self.scopes.push(Scope::Array { first: true });
        Ok(())
    }

    /// Closes the innermost array
    pub fn end_array(&mut self) -> Result<()> {
        match self.scopes.pop() {
            Some(Scope::Array { .. }) => {
                self.formatter.end_array(&mut self.out)?;
                self.end_value()
            }
            _ => Err(Error::internal("end_array outside of an array")),
        }
    }

    /// Writes an object key; the next call must write its value
    pub fn key(&mut self, name: &str) -> Result<()> {
        let first = match self.scopes.last_mut() {
            Some(Scope::Object { first }) => std::mem::replace(first, false),
            _ => return Err(Error::internal("object key outside of an object")),
        };
        self.formatter.begin_object_key(&mut self.out, first)?;
        serde_json::to_writer(&mut self.out, name)?;
        self.formatter.end_object_key(&mut self.out)?;
        self.formatter.begin_object_value(&mut self.out)?;
        Ok(())
    }

    /// Writes `null`
    pub fn null(&mut self) -> Result<()> {
        self.begin_value()?;
        self.formatter.write_null(&mut self.out)?;
        self.end_value()
    }

    /// Writes a boolean
    pub fn bool(&mut self, value: bool) -> Result<()> {
        self.begin_value()?;
        self.formatter.write_bool(&mut self.out, value)?;
        self.end_value()
    }

    /// Writes a signed integer
    pub fn i64(&mut self, value: i64) -> Result<()> {
        self.begin_value()?;
        self.formatter.write_i64(&mut self.out, value)?;
        self.end_value()
    }

    /// Writes an unsigned integer
    pub fn u64(&mut self, value: u64) -> Result<()> {
        self.begin_value()?;
        self.formatter.write_u64(&mut self.out, value)?;
        self.end_value()
    }

    /// Writes a finite `float` in its shortest round-tripping form
    pub fn f32(&mut self, value: f32) -> Result<()> {
        self.begin_value()?;
        self.formatter.write_f32(&mut self.out, value)?;
        self.end_value()
    }

    /// Writes a finite `double` in its shortest round-tripping form
    pub fn f64(&mut self, value: f64) -> Result<()> {
        self.begin_value()?;
        self.formatter.write_f64(&mut self.out, value)?;
        self.end_value()
    }

    /// Writes an escaped string
    pub fn string(&mut self, value: &str) -> Result<()> {
        self.begin_value()?;
        serde_json::to_writer(&mut self.out, value)?;
        self.end_value()
    }

    /// The text generated so far
    pub fn written(&self) -> &[u8] {
        &self.out
    }

    /// Returns the generated text once every scope is closed
    pub fn finish(self) -> Result<String> {
        if !self.scopes.is_empty() {
            return Err(Error::internal(format!(
                "{} JSON scope(s) left open",
                self.scopes.len()
            )));
        }
        String::from_utf8(self.out).map_err(|e| Error::internal(e.to_string()))
    }

    fn begin_value(&mut self) -> Result<()> {
        if let Some(Scope::Array { first }) = self.scopes.last_mut() {
            let first = std::mem::replace(first, false);
            self.formatter.begin_array_value(&mut self.out, first)?;
        }
        Ok(())
    }

    fn end_value(&mut self) -> Result<()> {
        match self.scopes.last() {
            Some(Scope::Array { .. }) => self.formatter.end_array_value(&mut self.out)?,
            Some(Scope::Object { .. }) => self.formatter.end_object_value(&mut self.out)?,
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample<F: Formatter>(generator: &mut JsonGenerator<F>) -> Result<()> {
        generator.begin_object()?;
        generator.key("name")?;
        generator.string("a \"quoted\" value")?;
        generator.key("list")?;
        generator.begin_array()?;
        generator.u64(1)?;
        generator.f64(2.5)?;
        generator.null()?;
        generator.end_array()?;
        generator.key("empty")?;
        generator.begin_object()?;
        generator.end_object()?;
        generator.end_object()
    }

    #[test]
    fn test_compact_output() {
        let mut generator = JsonGenerator::compact();
        sample(&mut generator).unwrap();
        assert_eq!(
            generator.finish().unwrap(),
            r#"{"name":"a \"quoted\" value","list":[1,2.5,null],"empty":{}}"#
        );
    }

    #[test]
    fn test_pretty_output() {
        let mut generator = JsonGenerator::pretty();
        sample(&mut generator).unwrap();
        let text = generator.finish().unwrap();
        assert!(text.starts_with("{\n  \"name\": "));
        assert!(text.contains("\"list\": [\n    1,\n    2.5,\n    null\n  ]"));
        let compact: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(compact["list"][1], 2.5);
    }

    #[test]
    fn test_runtime_layout_matches_static() {
        let mut compact = JsonGenerator::with_layout(false);
        sample(&mut compact).unwrap();
        let mut expected = JsonGenerator::compact();
        sample(&mut expected).unwrap();
        assert_eq!(compact.finish().unwrap(), expected.finish().unwrap());

        let mut pretty = JsonGenerator::with_layout(true);
        sample(&mut pretty).unwrap();
        let mut expected = JsonGenerator::pretty();
        sample(&mut expected).unwrap();
        assert_eq!(pretty.finish().unwrap(), expected.finish().unwrap());
    }

    #[test]
    fn test_written_is_incremental() {
        let mut generator = JsonGenerator::compact();
        generator.begin_object().unwrap();
        generator.key("a").unwrap();
        generator.u64(1).unwrap();
        assert_eq!(generator.written(), br#"{"a":1"#);
    }

    #[test]
    fn test_unbalanced_scopes() {
        let mut generator = JsonGenerator::compact();
        generator.begin_array().unwrap();
        assert!(generator.end_object().is_err());

        let mut generator = JsonGenerator::compact();
        generator.begin_object().unwrap();
        assert!(generator.finish().is_err());
    }
}
