//! Which containers accept new children.
//!
//! Pure functions of a container's own flags. Callers check these before
//! building a mutating command; the dispatcher does not re-validate.

use glob::Pattern;
use medialib_types::{Container, MediaClass};

pub fn is_editable(c: &Container) -> bool {
    c.editable
}

/// Whether a child of `child_class` may be added to `c`.
pub fn can_add(c: &Container, child_class: &str) -> bool {
    if !is_editable(c) {
        return false;
    }

    if child_class == MediaClass::Directory.as_str() {
        return matches!(c.class, MediaClass::RootPhotos | MediaClass::RootDirectories);
    }

    match &c.child_classes {
        None => true,
        Some(allowed) => allowed.iter().any(|pattern| class_matches(pattern, child_class)),
    }
}

fn class_matches(pattern: &str, class: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(p) => p.matches(class),
        Err(e) => {
            log::debug!(target: "mdb", "invalid child class pattern {:?}: {}", pattern, e);
            pattern == class
        }
    }
}

pub fn set_editable(c: &mut Container) {
    c.editable = true;
}

/// Restrict `c` to children matching `pattern` (in addition to any already
/// allowed).
pub fn add_child_class(c: &mut Container, pattern: &str) {
    let allowed = c.child_classes.get_or_insert_with(Vec::new);
    if !allowed.iter().any(|p| p == pattern) {
        allowed.push(pattern.to_string());
    }
}

/// Drop the editable marker together with the allow-list.
pub fn clear_editable(c: &mut Container) {
    c.editable = false;
    c.child_classes = None;
}
