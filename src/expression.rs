//! Small file expression language used by renamers and idempotent keys.
//!
//! Literal text with `${...}` placeholders:
//!
//! | token                    | value                                           |
//! |--------------------------|-------------------------------------------------|
//! | `file:name`              | path relative to the consumer root              |
//! | `file:name.noext`        | relative path without its last extension        |
//! | `file:name.ext`, `file:ext` | last extension, without the dot              |
//! | `file:onlyname`          | file name without directories                   |
//! | `file:onlyname.noext`    | file name without its last extension            |
//! | `file:parent`            | absolute parent directory                       |
//! | `file:path`, `file:absolute.path` | absolute path                          |
//! | `file:relative.path`     | same as `file:name`                             |
//! | `file:length`, `file:size` | size in bytes                                 |
//! | `file:modified`          | mtime in milliseconds since the Unix epoch      |
//! | `date:now:FMT`           | local time, strftime `FMT`                      |
//! | `date:file:FMT`          | file mtime (local), strftime `FMT`              |
//!
//! Unknown tokens and bad date formats are rejected when parsing, never at evaluation.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::UNIX_EPOCH;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};

use crate::errors::ClaimError;
use crate::file_ref::FileRef;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name,
    NameNoExt,
    Ext,
    OnlyName,
    OnlyNameNoExt,
    Parent,
    AbsolutePath,
    Length,
    Modified,
    DateNow(String),
    DateFile(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Token(Token),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    source: String,
    parts: Vec<Part>,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ClaimError> {
        let invalid = |reason: String| ClaimError::InvalidExpression {
            expression: source.to_string(),
            reason,
        };

        let mut parts = Vec::new();
        let mut rest = source;
        while let Some(start) = rest.find("${") {
            if start > 0 {
                parts.push(Part::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or_else(|| invalid("unterminated '${'".to_string()))?;
            let token = parse_token(after[..end].trim()).map_err(invalid)?;
            parts.push(Part::Token(token));
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }
        if parts.is_empty() {
            return Err(invalid("expression is empty".to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True if the expression has at least one placeholder.
    pub fn is_dynamic(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Token(_)))
    }

    pub fn evaluate(&self, file: &FileRef) -> String {
        let mut out = String::with_capacity(self.source.len() + 32);
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Token(token) => push_token(&mut out, token, file),
            }
        }
        out
    }
}

impl FromStr for Expression {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_token(body: &str) -> Result<Token, String> {
    if let Some(fmt) = body.strip_prefix("date:now:") {
        return check_date_format(fmt).map(|_| Token::DateNow(fmt.to_string()));
    }
    if let Some(fmt) = body.strip_prefix("date:file:") {
        return check_date_format(fmt).map(|_| Token::DateFile(fmt.to_string()));
    }
    let token = match body {
        "file:name" | "file:relative.path" => Token::Name,
        "file:name.noext" => Token::NameNoExt,
        "file:name.ext" | "file:ext" => Token::Ext,
        "file:onlyname" => Token::OnlyName,
        "file:onlyname.noext" => Token::OnlyNameNoExt,
        "file:parent" => Token::Parent,
        "file:path" | "file:absolute.path" => Token::AbsolutePath,
        "file:length" | "file:size" => Token::Length,
        "file:modified" => Token::Modified,
        other => return Err(format!("unknown token '${{{other}}}'")),
    };
    Ok(token)
}

fn check_date_format(fmt: &str) -> Result<(), String> {
    if fmt.is_empty() {
        return Err("date format is empty".to_string());
    }
    if StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error)) {
        return Err(format!("invalid date format '{fmt}'"));
    }
    Ok(())
}

fn push_token(out: &mut String, token: &Token, file: &FileRef) {
    match token {
        Token::Name => push_path(out, file.relative_path()),
        Token::NameNoExt => push_path(out, &file.relative_path().with_extension("")),
        Token::Ext => {
            if let Some(ext) = file.absolute_path().extension() {
                out.push_str(&ext.to_string_lossy());
            }
        }
        Token::OnlyName => out.push_str(&file.only_name()),
        Token::OnlyNameNoExt => {
            if let Some(stem) = file.absolute_path().file_stem() {
                out.push_str(&stem.to_string_lossy());
            }
        }
        Token::Parent => push_path(out, file.parent()),
        Token::AbsolutePath => push_path(out, file.absolute_path()),
        Token::Length => out.push_str(&file.len().to_string()),
        Token::Modified => {
            let millis = file
                .modified()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0);
            out.push_str(&millis.to_string());
        }
        Token::DateNow(fmt) => out.push_str(&Local::now().format(fmt).to_string()),
        Token::DateFile(fmt) => {
            let at: DateTime<Local> = file.modified().into();
            out.push_str(&at.format(fmt).to_string());
        }
    }
}

fn push_path(out: &mut String, path: &Path) {
    out.push_str(&path.to_string_lossy());
}
