//! Hierarchical entry names.

use std::fmt;

/// A directory entry name as a list of relative components, root first.
///
/// The textual form is the usual one: leaf first, comma separated
/// (`cn=Anna,ou=Sales,o=Acme`). Commas inside a component are written `\,`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DirName {
    components: Vec<String>,
}

impl DirName {
    /// The empty name.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse the leaf-first textual form.
    pub fn parse(text: &str) -> Self {
        let mut components = Vec::new();
        let mut current = String::new();
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    current.push(c);
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                ',' => components.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }
        components.push(current);
        let mut components: Vec<String> = components
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        components.reverse();
        Self { components }
    }

    /// Build from root-first components.
    pub fn from_components<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            components: components.into_iter().map(Into::into).collect(),
        }
    }

    /// Root-first components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Whether `ancestor` is this name or one of its ancestors.
    pub fn starts_with(&self, ancestor: &DirName) -> bool {
        self.components.len() >= ancestor.components.len()
            && self
                .components
                .iter()
                .zip(&ancestor.components)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// The ancestor made of the first `n` components.
    ///
    /// Returns `None` when `n` exceeds the length.
    pub fn prefix(&self, n: usize) -> Option<DirName> {
        (n <= self.components.len()).then(|| Self {
            components: self.components[..n].to_vec(),
        })
    }

    /// This name followed by the components of `relative`.
    pub fn join(&self, relative: &DirName) -> DirName {
        let mut components = self.components.clone();
        components.extend(relative.components.iter().cloned());
        Self { components }
    }

    /// The child named `rdn`.
    pub fn child(&self, rdn: impl Into<String>) -> DirName {
        let mut components = self.components.clone();
        components.push(rdn.into());
        Self { components }
    }

    /// The part of this name below `base`, if `base` is an ancestor.
    pub fn relative_to(&self, base: &DirName) -> Option<DirName> {
        self.starts_with(base).then(|| Self {
            components: self.components[base.len()..].to_vec(),
        })
    }
}

impl fmt::Display for DirName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.components.iter().rev().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(component)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_root_first() {
        let name = DirName::parse("cn=Anna, ou=Sales,o=Acme");
        assert_eq!(name.components(), ["o=Acme", "ou=Sales", "cn=Anna"]);
        assert_eq!(name.to_string(), "cn=Anna,ou=Sales,o=Acme");
        assert!(DirName::parse("").is_empty());
    }

    #[test]
    fn test_escaped_comma_stays_in_component() {
        let name = DirName::parse(r"cn=Meier\, Anna,o=Acme");
        assert_eq!(name.len(), 2);
        assert_eq!(name.components()[1], r"cn=Meier\, Anna");
    }

    #[test]
    fn test_prefix_relations() {
        let base = DirName::parse("o=Acme");
        let leaf = DirName::parse("cn=Anna,ou=Sales,o=acme");
        assert!(leaf.starts_with(&base));
        assert!(!base.starts_with(&leaf));
        assert_eq!(leaf.prefix(2), Some(DirName::parse("ou=Sales,o=acme")));
        assert_eq!(leaf.prefix(4), None);
        let rel = leaf.relative_to(&base).unwrap();
        assert_eq!(rel.to_string(), "cn=Anna,ou=Sales");
        assert_eq!(base.join(&rel).len(), 3);
        assert_eq!(base.child("ou=IT").to_string(), "ou=IT,o=Acme");
    }
}
