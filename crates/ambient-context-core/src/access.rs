//! Simulated access control.
//!
//! A viewer is represented by a fixed set of principal strings (for example
//! `"group:all"` plus the viewer's own user id). A chunk is visible when it
//! carries no ACL, or when the viewer holds at least one listed principal.

use std::collections::HashSet;

/// The principals a viewer holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principals(HashSet<String>);

impl Principals {
    pub fn new<I, S>(principals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(principals.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, principal: &str) -> bool {
        self.0.contains(principal)
    }

    /// Whether content guarded by `acl` is visible to this viewer.
    ///
    /// `None` (or an empty list) is public.
    pub fn can_see(&self, acl: Option<&[String]>) -> bool {
        match acl {
            None => true,
            Some([]) => true,
            Some(list) => list.iter().any(|p| self.0.contains(p)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_visible_to_everyone() {
        assert!(Principals::default().can_see(None));
        assert!(Principals::default().can_see(Some(&[])));
    }

    #[test]
    fn test_empty_viewer_sees_no_restricted_content() {
        let acl = vec!["group:all".to_string()];
        assert!(!Principals::default().can_see(Some(&acl)));
    }

    #[test]
    fn test_intersection_required() {
        let viewer = Principals::new(["group:all", "user-sarah"]);
        let allowed = vec!["user-sarah".to_string(), "user-priya".to_string()];
        let denied = vec!["group:leads".to_string()];
        assert!(viewer.can_see(Some(&allowed)));
        assert!(!viewer.can_see(Some(&denied)));
    }
}
