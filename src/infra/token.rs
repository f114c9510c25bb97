use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is empty")]
    Empty,

    #[error("failed to read token file {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("failed to write token file {path}: {source}")]
    Write { path: String, source: io::Error },
}

pub fn token_path(state_dir: &Path) -> PathBuf {
    state_dir.join("token")
}

pub fn load_token(state_dir: &Path) -> Result<Option<String>, TokenError> {
    let path = token_path(state_dir);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(TokenError::Read {
                path: path.display().to_string(),
                source,
            });
        }
    };
    let token = raw.trim();
    if token.is_empty() {
        return Ok(None);
    }
    Ok(Some(token.to_string()))
}

pub fn save_token(state_dir: &Path, token: &str) -> Result<(), TokenError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    let path = token_path(state_dir);
    let write_error = |source: io::Error| TokenError::Write {
        path: path.display().to_string(),
        source,
    };
    fs::create_dir_all(state_dir).map_err(write_error)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, format!("{token}\n")).map_err(write_error)?;
    fs::rename(&tmp, &path).map_err(write_error)?;
    Ok(())
}

/// Returns whether a stored token was removed.
pub fn clear_token(state_dir: &Path) -> Result<bool, TokenError> {
    let path = token_path(state_dir);
    match fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(TokenError::Write {
            path: path.display().to_string(),
            source,
        }),
    }
}
