//! Field validators shared by request handlers.
//!
//! Each returns a human-readable message on failure so handlers can collect
//! every problem of a request into one itemized list.

pub const MAX_NOTE_LEN: usize = 500;
pub const MIN_PASSWORD_LEN: usize = 8;

pub fn phone(field: &str, value: &str) -> Result<(), String> {
    if value.len() == 10 && value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(format!("{field} must be a valid 10-digit phone number"))
    }
}

pub fn email(value: &str) -> Result<(), String> {
    let value = value.trim();
    match value.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && domain.contains('.') && !domain.starts_with('.') =>
        {
            Ok(())
        }
        _ => Err("Please enter a valid email address".to_string()),
    }
}

pub fn required(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} is required"))
    } else {
        Ok(())
    }
}

pub fn max_len(field: &str, value: &str, max: usize) -> Result<(), String> {
    if value.chars().count() > max {
        Err(format!("{field} cannot exceed {max} characters"))
    } else {
        Ok(())
    }
}

pub fn password(value: &str) -> Result<(), String> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        Err(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        ))
    } else {
        Ok(())
    }
}

/// Collects validation failures in the order they were checked.
#[derive(Debug, Default)]
pub struct Problems(Vec<String>);

impl Problems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, result: Result<(), String>) {
        if let Err(message) = result {
            self.0.push(message);
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(())` when nothing failed, otherwise every collected message.
    pub fn finish(self) -> Result<(), Vec<String>> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_requires_ten_digits() {
        assert!(phone("Contact phone", "9876543210").is_ok());
        assert!(phone("Contact phone", "98765").is_err());
        assert!(phone("Contact phone", "98765abcde").is_err());
    }

    #[test]
    fn email_shape() {
        assert!(email("a@b.co").is_ok());
        assert!(email("no-at-sign").is_err());
        assert!(email("@b.co").is_err());
        assert!(email("a@localhost").is_err());
    }

    #[test]
    fn problems_collects_in_order() {
        let mut problems = Problems::new();
        problems.check(required("Name", " "));
        problems.check(required("City", "Pune"));
        problems.check(max_len("Comment", &"x".repeat(501), MAX_NOTE_LEN));
        assert_eq!(
            problems.finish().unwrap_err(),
            vec![
                "Name is required".to_string(),
                "Comment cannot exceed 500 characters".to_string()
            ]
        );
    }
}
