//! Prompt context assembly.

use aera_core::defaults;

/// Join snippets with the context separator and truncate the result to
/// [`defaults::CONTEXT_MAX_CHARS`] characters.
pub fn assemble_context<S: AsRef<str>>(snippets: &[S]) -> String {
    assemble_context_with_limit(snippets, defaults::CONTEXT_MAX_CHARS)
}

/// [`assemble_context`] with an explicit character cap.
pub fn assemble_context_with_limit<S: AsRef<str>>(snippets: &[S], max_chars: usize) -> String {
    let joined = snippets
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(defaults::CONTEXT_SEPARATOR);

    match joined.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => joined[..byte_idx].to_string(),
        None => joined,
    }
}
