//! Intersection of candidate node sets for non-zero path levels.
//!
//! All names here are relative to the base name. A positive level is an
//! absolute depth from the directory root; a negative level `-n` says that
//! matching records are found `n` levels below the node.

use super::name::DirName;

/// A node plus the level that selects records relative to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativePath {
    pub relative: i64,
    pub name: DirName,
}

impl RelativePath {
    pub fn new(relative: i64, name: DirName) -> Self {
        Self { relative, name }
    }

    fn len(&self) -> i64 {
        self.name.len() as i64
    }

    /// Depth of the records this node selects.
    fn target_depth(&self) -> i64 {
        self.len() - self.relative
    }
}

/// Intersect positive-level candidate lists.
///
/// Of each pair the deeper list survives, restricted to paths below some
/// path of the shallower list. `None` when there are no lists at all.
pub fn intersect_positive(lists: Vec<(i64, Vec<DirName>)>) -> Option<Vec<DirName>> {
    let mut lists = lists.into_iter();
    let (mut merged_level, mut merged) = lists.next()?;
    for (level, paths) in lists {
        let (shorter, longer) = if level < merged_level {
            (paths, merged)
        } else {
            merged_level = level;
            (merged, paths)
        };
        merged = longer
            .into_iter()
            .filter(|long| shorter.iter().any(|short| long.starts_with(short)))
            .collect();
    }
    Some(merged)
}

/// Intersect negative-level candidate lists.
///
/// Two paths agree when they select the same record depth and one lies
/// below the other; the deeper one is kept. One path may agree with several
/// others, and each agreement is kept.
pub fn intersect_negative(lists: Vec<Vec<RelativePath>>) -> Option<Vec<RelativePath>> {
    let mut lists = lists.into_iter();
    let mut merged = lists.next()?;
    for current in lists {
        let mut next = Vec::new();
        for path in &merged {
            for other in &current {
                let (shorter, longer) = if path.len() < other.len() {
                    (path, other)
                } else {
                    (other, path)
                };
                if path.target_depth() == other.target_depth()
                    && longer.name.starts_with(&shorter.name)
                {
                    next.push(longer.clone());
                }
            }
        }
        merged = next;
    }
    Some(merged)
}

/// Restrict negative candidates by the positive ones.
///
/// A positive path below a negative node replaces it, with the level
/// adjusted so that the same record depth is selected (possibly level 0).
/// A negative node below a positive path is kept as is.
pub fn intersect_mixed(negative: &[RelativePath], positive: &[DirName]) -> Vec<RelativePath> {
    let mut merged = Vec::new();
    for neg in negative {
        for pos in positive {
            let pos_len = pos.len() as i64;
            if neg.len() < pos_len {
                if pos.starts_with(&neg.name) && neg.target_depth() >= pos_len {
                    merged.push(RelativePath::new(
                        pos_len - neg.len() + neg.relative,
                        pos.clone(),
                    ));
                }
            } else if neg.name.starts_with(pos) {
                merged.push(neg.clone());
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(text: &str) -> DirName {
        DirName::parse(text)
    }

    #[test]
    fn test_positive_keeps_deeper_paths_below_shallower() {
        let merged = intersect_positive(vec![
            (3, vec![n("ou=IT,ou=Sales"), n("ou=HR,ou=Admin")]),
            (2, vec![n("ou=Sales")]),
        ])
        .unwrap();
        assert_eq!(merged, vec![n("ou=IT,ou=Sales")]);
        assert_eq!(intersect_positive(Vec::new()), None);
    }

    #[test]
    fn test_negative_keeps_all_agreements() {
        // A at -2 selects its grandchildren; B1 and B2 at -1 select their
        // children. Both B1 and B2 agree with A.
        let a = RelativePath::new(-2, n("ou=A"));
        let b1 = RelativePath::new(-1, n("ou=B1,ou=A"));
        let b2 = RelativePath::new(-1, n("ou=B2,ou=A"));
        let other = RelativePath::new(-1, n("ou=C,ou=Z"));
        let merged = intersect_negative(vec![vec![a], vec![b1.clone(), b2.clone(), other]]).unwrap();
        assert_eq!(merged, vec![b1, b2]);
    }

    #[test]
    fn test_negative_depth_mismatch_is_dropped() {
        let a = RelativePath::new(-1, n("ou=A"));
        let b = RelativePath::new(-1, n("ou=B,ou=A"));
        assert!(intersect_negative(vec![vec![a], vec![b]]).unwrap().is_empty());
    }

    #[test]
    fn test_mixed_adjusts_level() {
        let neg = RelativePath::new(-2, n("ou=A"));
        let merged = intersect_mixed(&[neg.clone()], &[n("ou=B,ou=A"), n("ou=X")]);
        assert_eq!(merged, vec![RelativePath::new(-1, n("ou=B,ou=A"))]);

        let deep = RelativePath::new(-1, n("ou=B,ou=A"));
        assert_eq!(intersect_mixed(&[deep.clone()], &[n("ou=A")]), vec![deep]);

        // Positive path at the record depth itself.
        let merged = intersect_mixed(&[neg], &[n("cn=r,ou=B,ou=A")]);
        assert_eq!(merged, vec![RelativePath::new(0, n("cn=r,ou=B,ou=A"))]);
    }
}
