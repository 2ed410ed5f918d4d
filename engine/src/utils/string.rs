//! Naming convention conversion
//!
//! Request paths arrive in camelCase or snake_case; relations are named in
//! PascalCase and columns in snake_case.

/// Convert camelCase / PascalCase to snake_case
///
/// Acronyms stay together: `HTTPServer` becomes `http_server`.
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p == '_' => false,
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert snake_case / camelCase to PascalCase
pub fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("createdAt"), "created_at");
        assert_eq!(to_snake_case("CreatedAt"), "created_at");
        assert_eq!(to_snake_case("created_at"), "created_at");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("userID"), "user_id");
        assert_eq!(to_snake_case("page2Size"), "page2_size");
        assert_eq!(to_snake_case("name"), "name");
    }

    #[test]
    fn test_to_pascal_case() {
        assert_eq!(to_pascal_case("organization"), "Organization");
        assert_eq!(to_pascal_case("organization_unit"), "OrganizationUnit");
        assert_eq!(to_pascal_case("orgUnit"), "OrgUnit");
        assert_eq!(to_pascal_case("Organization"), "Organization");
        assert_eq!(to_pascal_case(""), "");
    }
}
