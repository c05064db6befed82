//! Request-style entry points used by the command-line tool
//!
//! These validate user-facing parameters (a single line, raw bytes, dry run)
//! and translate them into an [`AppendOptions`] for the engine.

use crate::append::{AppendEngine, AppendOptions, WriteOutcome};
use crate::error::{FiletoolError, escape_bytes};
use crate::io::scan::find_subslice;
use std::path::Path;
use tracing::debug;

/// Append a single line of text
#[derive(Debug, Clone)]
pub struct LineRequest<'a> {
    pub line: &'a str,
    pub path: &'a Path,
    pub line_ending: &'a [u8],
    pub unique: bool,
    pub comment_marker: Option<&'a str>,
    pub ignore_leading_whitespace: bool,
    pub ignore_trailing_whitespace: bool,
    pub create_if_missing: bool,
    pub make_parents: bool,
    pub unlink_first: bool,
    pub dry_run: bool,
}

impl<'a> LineRequest<'a> {
    /// Plain `\n`-terminated append that creates the file if needed
    pub fn new(line: &'a str, path: &'a Path) -> Self {
        Self {
            line,
            path,
            line_ending: b"\n",
            unique: false,
            comment_marker: None,
            ignore_leading_whitespace: false,
            ignore_trailing_whitespace: false,
            create_if_missing: true,
            make_parents: false,
            unlink_first: false,
            dry_run: false,
        }
    }

    fn validate(&self) -> Result<(), FiletoolError> {
        if self.line.is_empty() {
            return Err(FiletoolError::EmptyLine);
        }
        if self.unlink_first && !self.unique {
            return Err(FiletoolError::Requires {
                param: "unlink_first=True",
                requires: "unique=True",
            });
        }
        if self.make_parents && !self.create_if_missing {
            return Err(FiletoolError::Requires {
                param: "make_parents=True",
                requires: "create_if_missing=True",
            });
        }
        if self.ignore_leading_whitespace && !self.unique {
            return Err(FiletoolError::Requires {
                param: "ignore_leading_whitespace=True",
                requires: "unique=True",
            });
        }
        if self.ignore_trailing_whitespace && !self.unique {
            return Err(FiletoolError::Requires {
                param: "ignore_trailing_whitespace=True",
                requires: "unique=True",
            });
        }
        if self.line_ending.is_empty() {
            return Err(FiletoolError::EmptyDelimiter);
        }
        if find_subslice(self.line.as_bytes(), self.line_ending).is_some() {
            return Err(FiletoolError::LineContainsDelimiter {
                line_ending: escape_bytes(self.line_ending),
            });
        }
        Ok(())
    }

    /// Bytes that end up in the file: the line followed by its ending
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.line.len() + self.line_ending.len());
        payload.extend_from_slice(self.line.as_bytes());
        payload.extend_from_slice(self.line_ending);
        payload
    }

    fn options(&self) -> Result<AppendOptions, FiletoolError> {
        let mut builder = AppendOptions::builder()
            .unique(self.unique)
            .create_if_missing(self.create_if_missing)
            .make_parents(self.make_parents)
            .unlink_first(self.unlink_first)
            .ignore_leading_whitespace(self.ignore_leading_whitespace)
            .ignore_trailing_whitespace(self.ignore_trailing_whitespace);
        if self.unique {
            builder = builder.line_ending(self.line_ending);
        }
        if let Some(marker) = self.comment_marker {
            builder = builder.comment_marker(marker);
        }
        builder.build()
    }
}

/// Append raw bytes; uniqueness, if requested, is checked in binary mode
#[derive(Debug, Clone)]
pub struct BytesRequest<'a> {
    pub data: &'a [u8],
    pub path: &'a Path,
    pub unique: bool,
    pub create_if_missing: bool,
    pub make_parents: bool,
    pub unlink_first: bool,
    pub dry_run: bool,
}

impl<'a> BytesRequest<'a> {
    pub fn new(data: &'a [u8], path: &'a Path) -> Self {
        Self {
            data,
            path,
            unique: false,
            create_if_missing: true,
            make_parents: false,
            unlink_first: false,
            dry_run: false,
        }
    }

    fn validate(&self) -> Result<(), FiletoolError> {
        if self.data.is_empty() {
            return Err(FiletoolError::EmptyPayload);
        }
        if self.unlink_first && !self.unique {
            return Err(FiletoolError::Requires {
                param: "unlink_first=True",
                requires: "unique=True",
            });
        }
        if self.make_parents && !self.create_if_missing {
            return Err(FiletoolError::Requires {
                param: "make_parents=True",
                requires: "create_if_missing=True",
            });
        }
        Ok(())
    }

    fn options(&self) -> Result<AppendOptions, FiletoolError> {
        AppendOptions::builder()
            .unique(self.unique)
            .create_if_missing(self.create_if_missing)
            .make_parents(self.make_parents)
            .unlink_first(self.unlink_first)
            .build()
    }
}

/// Append `request.line` plus its line ending to `request.path`.
///
/// Returns the number of bytes written, or that would be written on a dry
/// run; 0 when the line was already present.
pub fn append_line_to_path(
    engine: &AppendEngine,
    request: &LineRequest<'_>,
) -> Result<usize, FiletoolError> {
    request.validate()?;
    let options = request.options()?;
    let payload = request.payload();
    if request.dry_run {
        debug!(path = %request.path.display(), bytes = payload.len(), "dry run, not writing");
        return Ok(payload.len());
    }
    Ok(engine
        .append(&payload, request.path, &options)?
        .bytes_written())
}

/// Append `request.data` to `request.path`; see [`append_line_to_path`] for
/// the return value.
pub fn append_bytes_to_path(
    engine: &AppendEngine,
    request: &BytesRequest<'_>,
) -> Result<usize, FiletoolError> {
    request.validate()?;
    let options = request.options()?;
    if request.dry_run {
        debug!(path = %request.path.display(), bytes = request.data.len(), "dry run, not writing");
        return Ok(request.data.len());
    }
    Ok(engine
        .append(request.data, request.path, &options)?
        .bytes_written())
}

/// Make sure `line` appears in a `\n`-separated config file, ignoring
/// comments and trailing whitespace when comparing. Missing files and parent
/// directories are created.
pub fn ensure_line_in_config_file(
    engine: &AppendEngine,
    path: &Path,
    line: &str,
    comment_marker: &str,
    ignore_leading_whitespace: bool,
) -> Result<WriteOutcome, FiletoolError> {
    let request = LineRequest {
        unique: true,
        comment_marker: Some(comment_marker),
        ignore_leading_whitespace,
        ignore_trailing_whitespace: true,
        make_parents: true,
        ..LineRequest::new(line, path)
    };
    request.validate()?;
    engine.append(&request.payload(), path, &request.options()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockDirConfig;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, AppendEngine) {
        let temp_dir = TempDir::new().unwrap();
        let engine = AppendEngine::new(LockDirConfig::new(temp_dir.path().join("locks"))).unwrap();
        (temp_dir, engine)
    }

    #[test]
    fn test_append_line_adds_line_ending() {
        let (temp_dir, engine) = setup();
        let path = temp_dir.path().join("f");
        let request = LineRequest::new("hello", &path);

        assert_eq!(append_line_to_path(&engine, &request).unwrap(), 6);
        assert_eq!(fs::read(&path).unwrap(), b"hello\n");
    }

    #[test]
    fn test_append_line_unique_crlf() {
        let (temp_dir, engine) = setup();
        let path = temp_dir.path().join("f");
        let request = LineRequest {
            unique: true,
            line_ending: b"\r\n",
            ..LineRequest::new("key=value", &path)
        };

        assert_eq!(append_line_to_path(&engine, &request).unwrap(), 11);
        assert_eq!(append_line_to_path(&engine, &request).unwrap(), 0);
        assert_eq!(fs::read(&path).unwrap(), b"key=value\r\n");
    }

    #[test]
    fn test_append_line_validation() {
        let (temp_dir, engine) = setup();
        let path = temp_dir.path().join("f");

        let err = append_line_to_path(&engine, &LineRequest::new("", &path)).unwrap_err();
        assert!(matches!(err, FiletoolError::EmptyLine));

        let request = LineRequest {
            unlink_first: true,
            ..LineRequest::new("x", &path)
        };
        let err = append_line_to_path(&engine, &request).unwrap_err();
        assert_eq!(err.cli_message(), "--unlink-first requires --unique");

        let request = LineRequest {
            ignore_trailing_whitespace: true,
            ..LineRequest::new("x", &path)
        };
        let err = append_line_to_path(&engine, &request).unwrap_err();
        assert_eq!(
            err.cli_message(),
            "--ignore-trailing-whitespace requires --unique"
        );

        let request = LineRequest {
            make_parents: true,
            create_if_missing: false,
            ..LineRequest::new("x", &path)
        };
        let err = append_line_to_path(&engine, &request).unwrap_err();
        assert!(matches!(err, FiletoolError::Requires { .. }));

        let err = append_line_to_path(&engine, &LineRequest::new("a\nb", &path)).unwrap_err();
        assert!(matches!(err, FiletoolError::LineContainsDelimiter { .. }));
        assert!(err.to_string().contains(r#"b"\n""#));

        assert!(!path.exists());
    }

    #[test]
    fn test_comment_marker_without_unique_rejected_by_engine_options() {
        let (temp_dir, engine) = setup();
        let path = temp_dir.path().join("f");
        let request = LineRequest {
            comment_marker: Some("#"),
            ..LineRequest::new("x", &path)
        };
        let err = append_line_to_path(&engine, &request).unwrap_err();
        assert_eq!(err.to_string(), "comment_marker requires unique_bytes=True");
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let (temp_dir, engine) = setup();
        let path = temp_dir.path().join("f");

        let request = LineRequest {
            dry_run: true,
            ..LineRequest::new("hello", &path)
        };
        assert_eq!(append_line_to_path(&engine, &request).unwrap(), 6);

        let request = BytesRequest {
            dry_run: true,
            ..BytesRequest::new(b"\x00\x01", &path)
        };
        assert_eq!(append_bytes_to_path(&engine, &request).unwrap(), 2);
        assert!(!path.exists());
    }

    #[test]
    fn test_append_bytes_binary_unique() {
        let (temp_dir, engine) = setup();
        let path = temp_dir.path().join("f");
        fs::write(&path, b"header BLOB trailer").unwrap();
        let request = BytesRequest {
            unique: true,
            ..BytesRequest::new(b"BLOB", &path)
        };

        assert_eq!(append_bytes_to_path(&engine, &request).unwrap(), 0);
        assert_eq!(fs::read(&path).unwrap(), b"header BLOB trailer");
    }

    #[test]
    fn test_append_bytes_validation() {
        let (temp_dir, engine) = setup();
        let path = temp_dir.path().join("f");

        let err = append_bytes_to_path(&engine, &BytesRequest::new(b"", &path)).unwrap_err();
        assert_eq!(err.cli_message(), "BYTES must not be empty");

        let request = BytesRequest {
            make_parents: true,
            create_if_missing: false,
            ..BytesRequest::new(b"x", &path)
        };
        let err = append_bytes_to_path(&engine, &request).unwrap_err();
        assert_eq!(
            err.cli_message(),
            "--make-parents requires file creation (do not use --do-not-create)"
        );
    }

    #[test]
    fn test_ensure_line_in_config_file() {
        let (temp_dir, engine) = setup();
        let path = temp_dir.path().join("etc/app.conf");

        let first = ensure_line_in_config_file(&engine, &path, "enabled = true", "#", false).unwrap();
        assert_eq!(first, WriteOutcome::Written(15));

        fs::write(&path, b"enabled = true   # set by installer\n").unwrap();
        let second =
            ensure_line_in_config_file(&engine, &path, "enabled = true", "#", false).unwrap();
        assert!(second.is_skipped());

        fs::write(&path, b"   enabled = true\n").unwrap();
        let indented =
            ensure_line_in_config_file(&engine, &path, "enabled = true", "#", true).unwrap();
        assert!(indented.is_skipped());
    }
}
