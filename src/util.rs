//! Small utility helpers used across modules.

use axum::http::HeaderMap;

use crate::error::AppError;

pub const USER_HEADER: &str = "x-user-id";

/// Acting user from the `x-user-id` header.
pub fn user_from_headers(headers: &HeaderMap) -> Result<String, AppError> {
  let raw = headers.get(USER_HEADER).and_then(|v| v.to_str().ok()).unwrap_or_default();
  normalize_user_id(raw).ok_or_else(|| AppError::Unauthorized(format!("missing {} header", USER_HEADER)))
}

/// Trimmed user id, `None` when blank.
pub fn normalize_user_id(raw: &str) -> Option<String> {
  Some(raw.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Map an arbitrary store key onto a file name.
/// Alphanumerics and '-' pass through; every other byte becomes "_xx" hex.
pub fn file_safe(key: &str) -> String {
  let mut out = String::with_capacity(key.len());
  for b in key.bytes() {
    if b.is_ascii_alphanumeric() || b == b'-' {
      out.push(b as char);
    } else {
      out.push_str(&format!("_{:02x}", b));
    }
  }
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn file_safe_is_injective_on_separators() {
    assert_eq!(file_safe("attempt:U1:T1"), "attempt_3aU1_3aT1");
    assert_ne!(file_safe("a:b"), file_safe("a_b"));
    assert_eq!(file_safe("../x"), "_2e_2e_2fx");
  }

  #[test]
  fn trunc_respects_char_boundaries() {
    assert_eq!(trunc_for_log("short", 10), "short");
    let t = trunc_for_log("héllo world", 2);
    assert!(t.starts_with('h'));
    assert!(t.ends_with("(12 bytes total)"));
  }

  #[test]
  fn user_header_is_required() {
    let mut h = HeaderMap::new();
    assert!(user_from_headers(&h).is_err());
    h.insert(USER_HEADER, " U1 ".parse().unwrap());
    assert_eq!(user_from_headers(&h).unwrap(), "U1");
    h.insert(USER_HEADER, "   ".parse().unwrap());
    assert!(matches!(user_from_headers(&h), Err(AppError::Unauthorized(_))));
  }

  #[test]
  fn blank_user_ids_normalize_to_none() {
    assert_eq!(normalize_user_id(""), None);
    assert_eq!(normalize_user_id(" \t"), None);
    assert_eq!(normalize_user_id(" U7 ").as_deref(), Some("U7"));
  }
}
