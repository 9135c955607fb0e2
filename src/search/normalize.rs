//! Unicode normalization for paths reported by filesystems that store
//! decomposed (NFD) names.

use std::borrow::Cow;

use unicode_normalization::{IsNormalized, UnicodeNormalization, is_nfc_quick, is_nfd_quick};

/// Returns true on platforms whose filesystem hands back decomposed names.
#[must_use]
pub fn decomposing_filesystem() -> bool {
    cfg!(target_os = "macos")
}

/// Compose `text` into NFC. Borrows when it is already composed.
#[must_use]
pub fn to_nfc(text: &str) -> Cow<'_, str> {
    if is_nfc_quick(text.chars()) == IsNormalized::Yes {
        return Cow::Borrowed(text);
    }
    let composed: String = text.nfc().collect();
    if composed == text {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(composed)
    }
}

/// Decompose `text` into NFD. Borrows when it is already decomposed.
#[must_use]
pub fn to_nfd(text: &str) -> Cow<'_, str> {
    if is_nfd_quick(text.chars()) == IsNormalized::Yes {
        return Cow::Borrowed(text);
    }
    let decomposed: String = text.nfd().collect();
    if decomposed == text {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(decomposed)
    }
}
