//! A reader for [NestedText](https://nestedtext.org) documents.
//!
//! NestedText holds only strings, lists and dictionaries, which makes it a
//! good fit for parameter files full of snippets: nothing needs quoting or
//! escaping. Every leaf comes back as [`Value::Str`].

use indexmap::map::Entry;
use paramfile_core::{Map, Value};
use thiserror::Error;

/// A syntax error in a NestedText document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct NestedTextError {
    /// 1-based line number.
    pub line: usize,
    /// What is wrong.
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// `key: value` or `key:`.
    DictItem { key: String, value: Option<String> },
    /// `: key` (one line of a multiline key).
    KeyLine(String),
    /// `- value` or `-`.
    ListItem(Option<String>),
    /// `> text` (one line of a multiline string).
    TextLine(String),
    /// `[...]` or `{...}`.
    Inline(String),
}

#[derive(Debug, Clone)]
struct Line {
    number: usize,
    indent: usize,
    kind: Kind,
}

/// Parses a NestedText document. An empty document yields [`Value::None`].
///
/// # Errors
///
/// Returns [`NestedTextError`] for malformed documents.
///
/// # Examples
///
/// ```rust
/// use paramfile::nestedtext;
///
/// let doc = "test_add:\n  -\n    a: 1\n    b: 2\n    c: 3\n";
/// let value = nestedtext::parse(doc).unwrap();
/// let cases = value.as_map().unwrap()["test_add"].as_list().unwrap();
/// assert_eq!(cases[0].as_map().unwrap()["c"].as_str(), Some("3"));
/// ```
pub fn parse(text: &str) -> Result<Value, NestedTextError> {
    let lines = lex(text)?;
    let Some(first) = lines.first() else {
        return Ok(Value::None);
    };
    if first.indent != 0 {
        return Err(error(first.number, "top-level content must not be indented"));
    }
    let mut parser = Parser { lines, pos: 0 };
    let value = parser.value(0)?;
    if let Some(line) = parser.lines.get(parser.pos) {
        return Err(error(line.number, "unexpected content at this indentation"));
    }
    Ok(value)
}

fn error(line: usize, message: impl Into<String>) -> NestedTextError {
    NestedTextError {
        line,
        message: message.into(),
    }
}

fn tagged<'a>(rest: &'a str, tag: char) -> Option<Option<&'a str>> {
    let mut chars = rest.chars();
    if chars.next() != Some(tag) {
        return None;
    }
    match chars.next() {
        None => Some(None),
        Some(' ') => Some(Some(&rest[2..])),
        Some(_) => None,
    }
}

fn lex(text: &str) -> Result<Vec<Line>, NestedTextError> {
    let mut lines = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let number = index + 1;
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let rest = raw.trim_start_matches(' ');
        if rest.trim().is_empty() || rest.starts_with('#') {
            continue;
        }
        if rest.starts_with('\t') {
            return Err(error(number, "indentation must use spaces, not tabs"));
        }
        let indent = raw.len() - rest.len();

        let kind = if let Some(value) = tagged(rest, '-') {
            Kind::ListItem(value.map(ToString::to_string))
        } else if let Some(text) = tagged(rest, '>') {
            Kind::TextLine(text.unwrap_or_default().to_string())
        } else if let Some(key) = tagged(rest, ':') {
            Kind::KeyLine(key.unwrap_or_default().to_string())
        } else if rest.starts_with('[') || rest.starts_with('{') {
            Kind::Inline(rest.trim_end().to_string())
        } else if let Some((key, value)) = rest.split_once(": ") {
            Kind::DictItem {
                key: key.trim_end().to_string(),
                value: Some(value.to_string()),
            }
        } else if let Some(key) = rest.trim_end().strip_suffix(':') {
            Kind::DictItem {
                key: key.trim_end().to_string(),
                value: None,
            }
        } else {
            return Err(error(number, format!("unrecognized line: {rest}")));
        };
        lines.push(Line {
            number,
            indent,
            kind,
        });
    }
    Ok(lines)
}

struct Parser {
    lines: Vec<Line>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Line> {
        self.lines.get(self.pos)
    }

    fn value(&mut self, indent: usize) -> Result<Value, NestedTextError> {
        let Some(line) = self.peek() else {
            return Ok(Value::Str(String::new()));
        };
        if line.indent != indent {
            return Err(error(line.number, "invalid indentation"));
        }
        match &line.kind {
            Kind::ListItem(_) => self.list(indent),
            Kind::DictItem { .. } | Kind::KeyLine(_) => self.dict(indent),
            Kind::TextLine(_) => Ok(self.text(indent)),
            Kind::Inline(source) => {
                let (number, source) = (line.number, source.clone());
                self.pos += 1;
                Inline::parse(&source).map_err(|message| error(number, message))
            }
        }
    }

    /// The value nested under a line at `parent` indentation: a deeper block
    /// if one follows, otherwise an empty string.
    fn nested(&mut self, parent: usize) -> Result<Value, NestedTextError> {
        match self.peek() {
            Some(next) if next.indent > parent => {
                let indent = next.indent;
                self.value(indent)
            }
            _ => Ok(Value::Str(String::new())),
        }
    }

    fn reject_nested(&self, parent: usize) -> Result<(), NestedTextError> {
        match self.peek() {
            Some(next) if next.indent > parent => {
                Err(error(next.number, "unexpected indentation"))
            }
            _ => Ok(()),
        }
    }

    fn list(&mut self, indent: usize) -> Result<Value, NestedTextError> {
        let mut items = Vec::new();
        while let Some(line) = self.peek() {
            if line.indent != indent {
                break;
            }
            let Kind::ListItem(inline) = &line.kind else {
                break;
            };
            let inline = inline.clone();
            self.pos += 1;
            let item = match inline {
                Some(text) => {
                    self.reject_nested(indent)?;
                    Value::Str(text)
                }
                None => self.nested(indent)?,
            };
            items.push(item);
        }
        Ok(Value::List(items))
    }

    fn dict(&mut self, indent: usize) -> Result<Value, NestedTextError> {
        let mut map = Map::new();
        while let Some(line) = self.peek() {
            if line.indent != indent {
                break;
            }
            let number = line.number;
            let (key, value) = match &line.kind {
                Kind::DictItem { key, value } => {
                    let (key, value) = (key.clone(), value.clone());
                    self.pos += 1;
                    let value = match value {
                        Some(text) => {
                            self.reject_nested(indent)?;
                            Value::Str(text)
                        }
                        None => self.nested(indent)?,
                    };
                    (key, value)
                }
                Kind::KeyLine(_) => {
                    let key = self.multiline_key(indent);
                    match self.peek() {
                        Some(next) if next.indent > indent => {}
                        _ => return Err(error(number, "multiline key requires a value")),
                    }
                    (key, self.nested(indent)?)
                }
                _ => break,
            };
            match map.entry(key) {
                Entry::Occupied(entry) => {
                    return Err(error(number, format!("duplicate key: {}", entry.key())));
                }
                Entry::Vacant(entry) => {
                    entry.insert(value);
                }
            }
        }
        Ok(Value::Map(map))
    }

    fn multiline_key(&mut self, indent: usize) -> String {
        let mut parts = Vec::new();
        while let Some(Line {
            indent: line_indent,
            kind: Kind::KeyLine(part),
            ..
        }) = self.peek()
        {
            if *line_indent != indent {
                break;
            }
            parts.push(part.clone());
            self.pos += 1;
        }
        parts.join("\n")
    }

    fn text(&mut self, indent: usize) -> Value {
        let mut parts = Vec::new();
        while let Some(Line {
            indent: line_indent,
            kind: Kind::TextLine(part),
            ..
        }) = self.peek()
        {
            if *line_indent != indent {
                break;
            }
            parts.push(part.clone());
            self.pos += 1;
        }
        Value::Str(parts.join("\n"))
    }
}

/// Parser for the single-line `[...]` and `{...}` forms.
struct Inline {
    chars: Vec<char>,
    pos: usize,
}

impl Inline {
    fn parse(source: &str) -> Result<Value, String> {
        let mut inline = Self {
            chars: source.chars().collect(),
            pos: 0,
        };
        let value = match inline.peek() {
            Some('[') => inline.list()?,
            _ => inline.dict()?,
        };
        inline.skip_spaces();
        if inline.pos < inline.chars.len() {
            return Err("extra characters after inline value".to_string());
        }
        Ok(value)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(' ') {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: char) -> Result<(), String> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!("expected '{c}'"))
        }
    }

    fn string(&mut self, stops: &[char]) -> String {
        let start = self.pos;
        while self.peek().is_some_and(|c| !stops.contains(&c)) {
            self.pos += 1;
        }
        self.chars[start..self.pos]
            .iter()
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn value(&mut self, stops: &[char]) -> Result<Value, String> {
        self.skip_spaces();
        match self.peek() {
            Some('[') => self.list(),
            Some('{') => self.dict(),
            _ => Ok(Value::Str(self.string(stops))),
        }
    }

    fn list(&mut self) -> Result<Value, String> {
        self.expect('[')?;
        self.skip_spaces();
        let mut items = Vec::new();
        if self.peek() == Some(']') {
            self.pos += 1;
            return Ok(Value::List(items));
        }
        loop {
            items.push(self.value(&[',', ']', '[', '{', '}'])?);
            self.skip_spaces();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') => {
                    self.pos += 1;
                    return Ok(Value::List(items));
                }
                _ => return Err("expected ',' or ']' in inline list".to_string()),
            }
        }
    }

    fn dict(&mut self) -> Result<Value, String> {
        self.expect('{')?;
        self.skip_spaces();
        let mut map = Map::new();
        if self.peek() == Some('}') {
            self.pos += 1;
            return Ok(Value::Map(map));
        }
        loop {
            let key = self.string(&[':', ',', '[', ']', '{', '}']);
            self.expect(':')?;
            let value = self.value(&[',', '}', '[', ']', '{'])?;
            if map.insert(key.clone(), value).is_some() {
                return Err(format!("duplicate key: {key}"));
            }
            self.skip_spaces();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {
                    self.pos += 1;
                    return Ok(Value::Map(map));
                }
                _ => return Err("expected ',' or '}' in inline dict".to_string()),
            }
        }
    }
}
