use log::{ info, warn };
use std::fs;
use std::path::Path;

/// Reads the default system prompt. Any failure yields an empty prompt.
pub fn load_prompt<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(text) => {
            info!("Loaded system prompt from {}", path.display());
            text.trim().to_string()
        }
        Err(e) => {
            warn!("Error reading prompt file '{}': {}", path.display(), e);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        fs::write(&path, "\n  You are Riko.  \n").unwrap();
        assert_eq!(load_prompt(&path), "You are Riko.");
    }

    #[test]
    fn test_missing_prompt_is_empty() {
        assert_eq!(load_prompt("/definitely/not/here/prompt.txt"), "");
    }
}
