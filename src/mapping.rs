//! A line-by-line parser for Proguard mapping files.
//!
//! The mapping file format is described
//! [here](https://www.guardsquare.com/en/products/proguard/manual/retrace).
//! Only class lines carry information needed to fix up a bundle, but every
//! kind of line is recognized so that callers can decide what to skip.

use std::fmt;
use std::str;

/// Error when parsing a proguard mapping line.
///
/// Since the mapping is parsed line-by-line, an error will also contain
/// the offending line.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ParseError<'s> {
    line: &'s [u8],
    line_number: usize,
    kind: ParseErrorKind,
}

impl<'s> ParseError<'s> {
    /// The offending line that caused the error.
    pub fn line(&self) -> &'s [u8] {
        self.line
    }

    /// The 1-based number of the offending line.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// The specific parse error.
    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line_number, self.kind)
    }
}

impl std::error::Error for ParseError<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.kind {
            ParseErrorKind::Utf8Error(ref e) => Some(e),
            _ => None,
        }
    }
}

/// The specific parse error.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ParseErrorKind {
    /// The line failed utf-8 conversion.
    Utf8Error(str::Utf8Error),
    /// A class line did not consist of exactly two names.
    InvalidClass,
    /// An indented field or method line could not be parsed.
    InvalidMember,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::Utf8Error(e) => e.fmt(f),
            ParseErrorKind::InvalidClass => f.write_str("line is not a valid class mapping"),
            ParseErrorKind::InvalidMember => f.write_str("line is not a valid member mapping"),
        }
    }
}

/// A Proguard Mapping Record.
#[derive(Clone, Debug, PartialEq)]
pub enum ProguardRecord<'s> {
    /// A comment line, such as the `# compiler: R8` header.
    Header {
        /// The key of the header, or the whole comment if it is not a pair.
        key: &'s str,
        /// Optional value if the header is a key/value pair.
        value: Option<&'s str>,
    },
    /// A class mapping.
    Class {
        /// Original name of the class.
        original: &'s str,
        /// Obfuscated name of the class.
        obfuscated: &'s str,
    },
    /// A field mapping.
    Field {
        /// Type of the field.
        ty: &'s str,
        /// Original name of the field.
        original: &'s str,
        /// Obfuscated name of the field.
        obfuscated: &'s str,
    },
    /// A method mapping.
    Method {
        /// Return type of the method.
        ty: &'s str,
        /// Original name of the method.
        original: &'s str,
        /// Obfuscated name of the method.
        obfuscated: &'s str,
        /// Arguments of the method as raw string.
        arguments: &'s str,
        /// The minified line range, if present.
        lines: Option<(usize, usize)>,
    },
}

impl<'s> ProguardRecord<'s> {
    /// Parses a single line from a proguard mapping file.
    ///
    /// # Examples
    ///
    /// ```
    /// use proguard_osgi::ProguardRecord;
    ///
    /// let parsed = ProguardRecord::try_parse(b"com.example.Foo -> a.b:");
    /// assert_eq!(
    ///     parsed,
    ///     Ok(ProguardRecord::Class {
    ///         original: "com.example.Foo",
    ///         obfuscated: "a.b",
    ///     })
    /// );
    ///
    /// let parsed = ProguardRecord::try_parse(b"    int count -> a");
    /// assert_eq!(
    ///     parsed,
    ///     Ok(ProguardRecord::Field {
    ///         ty: "int",
    ///         original: "count",
    ///         obfuscated: "a",
    ///     })
    /// );
    /// ```
    pub fn try_parse(line: &'s [u8]) -> Result<Self, ParseError<'s>> {
        parse_line(line, 1)
    }
}

/// A Proguard Mapping file.
#[derive(Clone, Default)]
pub struct ProguardMapping<'s> {
    source: &'s [u8],
}

impl fmt::Debug for ProguardMapping<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProguardMapping").finish()
    }
}

impl<'s> ProguardMapping<'s> {
    /// Create a new Proguard Mapping.
    pub fn new(source: &'s [u8]) -> Self {
        Self { source }
    }

    /// The raw bytes of the mapping.
    pub fn source(&self) -> &'s [u8] {
        self.source
    }

    /// Create an Iterator over [`ProguardRecord`]s.
    ///
    /// Blank lines are skipped.
    pub fn iter(&self) -> ProguardRecordIter<'s> {
        ProguardRecordIter {
            slice: self.source,
            line_number: 0,
        }
    }
}

/// An Iterator yielding [`ProguardRecord`]s, created by [`ProguardMapping::iter`].
#[derive(Clone, Default)]
pub struct ProguardRecordIter<'s> {
    slice: &'s [u8],
    line_number: usize,
}

impl fmt::Debug for ProguardRecordIter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProguardRecordIter")
            .field("line_number", &self.line_number)
            .finish()
    }
}

impl<'s> Iterator for ProguardRecordIter<'s> {
    type Item = Result<ProguardRecord<'s>, ParseError<'s>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.slice.is_empty() {
                return None;
            }
            let (line, rest) = split_line(self.slice);
            self.slice = rest;
            self.line_number += 1;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Some(parse_line(line, self.line_number));
        }
    }
}

fn parse_line(line: &[u8], line_number: usize) -> Result<ProguardRecord<'_>, ParseError<'_>> {
    let error = |kind| ParseError {
        line,
        line_number,
        kind,
    };
    let text = str::from_utf8(line).map_err(|e| error(ParseErrorKind::Utf8Error(e)))?;
    let text = text.trim_end_matches(['\r', '\n']);

    let trimmed = text.trim_start();
    if let Some(comment) = trimmed.strip_prefix('#') {
        return Ok(parse_header(comment));
    }
    if trimmed.len() != text.len() {
        parse_member(trimmed).ok_or_else(|| error(ParseErrorKind::InvalidMember))
    } else {
        parse_class(text).ok_or_else(|| error(ParseErrorKind::InvalidClass))
    }
}

fn parse_header(comment: &str) -> ProguardRecord<'_> {
    let comment = comment.trim();
    match comment.split_once(':') {
        Some((key, value)) if !comment.starts_with('{') => ProguardRecord::Header {
            key: key.trim(),
            value: Some(value.trim()),
        },
        _ => ProguardRecord::Header {
            key: comment,
            value: None,
        },
    }
}

/// `originalclassname -> obfuscatedclassname:`
fn parse_class(line: &str) -> Option<ProguardRecord<'_>> {
    let line = line.trim_end().strip_suffix(':')?;
    let mut parts = line.split(" -> ");
    let original = parts.next()?;
    let obfuscated = parts.next()?;
    if parts.next().is_some() || !is_name(original) || !is_name(obfuscated) {
        return None;
    }
    Some(ProguardRecord::Class {
        original,
        obfuscated,
    })
}

/// `type name -> obfuscated` or
/// `[startline:endline:]type name(args)[:origstart[:origend]] -> obfuscated`
fn parse_member(line: &str) -> Option<ProguardRecord<'_>> {
    let (lhs, obfuscated) = line.split_once(" -> ")?;
    let obfuscated = obfuscated.trim_end();
    if !is_name(obfuscated) {
        return None;
    }

    let (lines, lhs) = match lhs.split_once(':') {
        Some((start, rest)) if is_number(start) => {
            let (end, rest) = rest.split_once(':')?;
            (Some((start.parse().ok()?, end.parse().ok()?)), rest)
        }
        _ => (None, lhs),
    };

    let (ty, signature) = lhs.split_once(' ')?;
    if ty.is_empty() {
        return None;
    }

    match signature.split_once('(') {
        Some((original, rest)) => {
            let (arguments, _original_lines) = rest.split_once(')')?;
            if original.is_empty() {
                return None;
            }
            Some(ProguardRecord::Method {
                ty,
                original,
                obfuscated,
                arguments,
                lines,
            })
        }
        None if is_name(signature) => Some(ProguardRecord::Field {
            ty,
            original: signature,
            obfuscated,
        }),
        None => None,
    }
}

fn is_name(s: &str) -> bool {
    !s.is_empty() && !s.contains(char::is_whitespace)
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn split_line(bytes: &[u8]) -> (&[u8], &[u8]) {
    match bytes.iter().position(|c| *c == b'\n') {
        Some(pos) => (&bytes[..pos], &bytes[pos + 1..]),
        None => (bytes, b""),
    }
}
