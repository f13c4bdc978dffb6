//! Name normalization shared by the schema, the registry and the facade.
//!
//! Model names, table names and relation names are compared in normalized
//! form: lower-cased and singular. Result keys for to-many relations use the
//! plural form.

/// Lower-case and singularize a model, table or relation name.
pub fn normalize(name: &str) -> String {
    singularize(&name.trim().to_lowercase())
}

/// Naive English singular form of an already lower-cased word.
pub fn singularize(word: &str) -> String {
    if word.len() > 3 {
        if let Some(stem) = word.strip_suffix("ies") {
            return format!("{stem}y");
        }
    }
    for suffix in ["sses", "xes", "ches", "shes", "zzes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
        return word.to_string();
    }
    match word.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => word.to_string(),
    }
}

/// Naive English plural form of a singular lower-cased word.
pub fn pluralize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix('y') {
        let before = stem.chars().last();
        if before.is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{stem}ies");
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        return format!("{word}es");
    }
    format!("{word}s")
}

/// Conventional foreign key column for a model: `{model}_id`.
pub fn foreign_key_for(model: &str) -> String {
    format!("{}_id", normalize(model))
}

/// Default pivot table for a many-to-many pair: both names sorted, joined by `_`.
pub fn pivot_table_for(a: &str, b: &str) -> String {
    let mut names = [normalize(a), normalize(b)];
    names.sort();
    names.join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_and_singularizes() {
        assert_eq!(normalize("Users"), "user");
        assert_eq!(normalize("user"), "user");
        assert_eq!(normalize("Categories"), "category");
        assert_eq!(normalize("addresses"), "address");
        assert_eq!(normalize("address"), "address");
        assert_eq!(normalize("Status"), "status");
        assert_eq!(normalize("boxes"), "box");
    }

    #[test]
    fn pluralize_round_trips_common_words() {
        for word in ["user", "post", "tag", "category", "address", "box", "key"] {
            assert_eq!(normalize(&pluralize(word)), word, "{word}");
        }
    }

    #[test]
    fn pivot_name_is_order_independent() {
        assert_eq!(pivot_table_for("Post", "Tag"), "post_tag");
        assert_eq!(pivot_table_for("tags", "posts"), "post_tag");
        assert_eq!(foreign_key_for("Role"), "role_id");
    }
}
