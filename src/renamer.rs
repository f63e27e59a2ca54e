//! Computes the destination of pre-move, commit-move and failure-move renames.

use std::path::PathBuf;

use crate::errors::ClaimError;
use crate::expression::Expression;
use crate::file_ref::FileRef;
use crate::platform::{TargetOs, is_absolute_path, strip_trailing_separator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Renamer {
    /// `prefix + name + postfix` in the file's own directory. A prefix such as
    /// `".done/"` therefore moves the file into a subdirectory.
    Affix {
        prefix: Option<String>,
        postfix: Option<String>,
    },
    /// Evaluated expression; a relative result is resolved against the consumer root.
    Expression(Expression),
}

impl Renamer {
    pub fn affix(prefix: Option<String>, postfix: Option<String>) -> Self {
        Renamer::Affix { prefix, postfix }
    }

    /// Interpret a move option the way `move=`, `preMove=` and `moveFailed=` are read.
    ///
    /// A value without `${` names a directory: relative directories are taken from
    /// the file's parent, and the file keeps its name. Anything else is an expression.
    pub fn from_move_option(value: &str, os: TargetOs) -> Result<Self, ClaimError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ClaimError::Config("move option is empty".to_string()));
        }
        if value.contains("${") {
            return Ok(Renamer::Expression(Expression::parse(value)?));
        }
        let sep = os.separator();
        let dir = strip_trailing_separator(value, os);
        let mut expr = String::with_capacity(dir.len() + 40);
        if !is_absolute_path(dir, os) {
            expr.push_str("${file:parent}");
            expr.push(sep);
        }
        expr.push_str(dir);
        if !dir.ends_with(sep) {
            expr.push(sep);
        }
        expr.push_str("${file:onlyname}");
        Ok(Renamer::Expression(Expression::parse(&expr)?))
    }

    pub fn destination(&self, file: &FileRef) -> PathBuf {
        match self {
            Renamer::Affix { prefix, postfix } => {
                let name = format!(
                    "{}{}{}",
                    prefix.as_deref().unwrap_or(""),
                    file.only_name(),
                    postfix.as_deref().unwrap_or("")
                );
                file.parent().join(name)
            }
            Renamer::Expression(expr) => {
                let target = PathBuf::from(expr.evaluate(file));
                if target.is_absolute() {
                    target
                } else {
                    file.root().join(target)
                }
            }
        }
    }

    /// The file as it will be after the rename.
    pub fn rename(&self, file: &FileRef) -> FileRef {
        file.relocated(self.destination(file))
    }
}
