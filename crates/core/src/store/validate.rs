//! Validation of caller-supplied collection parameters.

use crate::error::StoreError;

use super::query::{Index, Sort};

/// Validate a sort specification. Every key must be non-empty.
pub fn validate_sort(sort: &Sort) -> Result<(), StoreError> {
    if sort.iter().any(|(key, _)| key.is_empty()) {
        return Err(StoreError::InvalidOrder(
            "order key can not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validate an index definition before it reaches a backend.
pub fn validate_index(index: &Index) -> Result<(), StoreError> {
    if index.name.is_empty() {
        return Err(StoreError::InvalidIndex("name can not be empty".to_string()));
    }
    if index.keys.is_empty() {
        return Err(StoreError::InvalidIndex("keys can not be empty".to_string()));
    }
    if index.keys.iter().any(|(key, _)| key.is_empty()) {
        return Err(StoreError::InvalidIndex("key can not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::query::OrderBy;

    #[test]
    fn empty_sort_is_valid() {
        assert!(validate_sort(&Vec::new()).is_ok());
    }

    #[test]
    fn empty_sort_key_is_rejected() {
        let sort = vec![("name".to_string(), OrderBy::Asc), (String::new(), OrderBy::Desc)];
        assert!(matches!(validate_sort(&sort), Err(StoreError::InvalidOrder(_))));
    }

    #[test]
    fn index_without_keys_is_rejected() {
        let err = validate_index(&Index::new("empty")).unwrap_err();
        assert_eq!(err.to_string(), "invalid index: keys can not be empty");
    }

    #[test]
    fn index_with_blank_key_or_name_is_rejected() {
        assert!(validate_index(&Index::new("x").key("", OrderBy::Asc)).is_err());
        assert!(validate_index(&Index::new("").key("a", OrderBy::Asc)).is_err());
        assert!(validate_index(&Index::new("x").key("a", OrderBy::Asc)).is_ok());
    }
}
