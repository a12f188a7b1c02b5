//! # Identifier Normalizer
//!
//! Turns raw dependency specifiers into canonical [`Identifier`]s.
//!
//! - `normalize`: standard URL canonicalization (scheme and host case,
//!   default ports, `.`/`..` collapsing). Idempotent.
//! - `base_path`: drops query and fragment, truncates after the last `/`.
//! - `resolve_relative`: absolute specifiers are normalized directly,
//!   relative ones are resolved against a base.
//!
//! Bare names such as `"lodash"` (no `/` anywhere) are rejected: every
//! specifier must be a locator. `lib/util.js` has path structure and
//! resolves like `./lib/util.js`.

use crate::primitives::SCHEME_SEPARATOR;
use crate::types::{Identifier, ResolveError};
use url::Url;

/// Normalize an absolute locator.
pub fn normalize(raw: &str) -> Result<Identifier, ResolveError> {
    let url = Url::parse(raw).map_err(|e| ResolveError::UnresolvableSpecifier {
        specifier: raw.to_string(),
        reason: e.to_string(),
    })?;
    Ok(Identifier::from_canonical(url.into()))
}

/// Directory-like prefix of `id`, always ending in `/`.
#[must_use]
pub fn base_path(id: &Identifier) -> Identifier {
    let raw = id.as_str();
    let without_suffix = raw.find(['?', '#']).map_or(raw, |end| &raw[..end]);

    let base = match without_suffix.rfind('/') {
        Some(last) => without_suffix[..=last].to_string(),
        None => format!("{without_suffix}/"),
    };
    Identifier::from_canonical(base)
}

/// Resolve `specifier` as declared by a module whose base is `base`.
///
/// Relative specifiers go through URL reference resolution rather than
/// plain concatenation onto `base`: `/x` is rooted at the host (or the
/// filesystem root for `file:`), not appended to the base directory.
pub fn resolve_relative(base: &Identifier, specifier: &str) -> Result<Identifier, ResolveError> {
    if specifier.contains(SCHEME_SEPARATOR) {
        return normalize(specifier);
    }
    if !is_relative_locator(specifier) {
        return Err(ResolveError::BareSpecifier(specifier.to_string()));
    }

    let unresolvable = |e: url::ParseError| ResolveError::UnresolvableSpecifier {
        specifier: specifier.to_string(),
        reason: e.to_string(),
    };
    let joined = Url::parse(base.as_str())
        .and_then(|base| base.join(specifier))
        .map_err(unresolvable)?;
    Ok(Identifier::from_canonical(joined.into()))
}

/// Anything with path structure (`./x`, `../x`, `/x`, `sub/x`), or `.`/`..`.
fn is_relative_locator(specifier: &str) -> bool {
    specifier.contains('/') || specifier == "." || specifier == ".."
}

// =============================================================================
// TESTS
// =============================================================================
