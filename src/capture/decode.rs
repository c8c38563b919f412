//! Upstream Frame Decoder
//!
//! Expands the upstream's LZW-style compressed text back into the original
//! JSON text. The dictionary is rebuilt from scratch on every call.
//!
//! Codes are UTF-16 code units:
//! - `code < 256` is a literal unit
//! - `code >= 256` indexes the dictionary built during this same pass
//!
//! A code that is not yet in the dictionary resolves to
//! `previous + first(previous)`, which lets a frame reference the entry
//! being defined by the current step.

/// First code assigned to a dictionary entry.
const FIRST_DICT_CODE: u32 = 256;

/// Upper bound on expanded output, in code units.
///
/// Chained self-references grow output quadratically in the input length;
/// real frames expand to a few hundred units.
const MAX_DECODED_UNITS: usize = 1 << 20;

/// Decode an upstream frame.
///
/// Never fails: if the expansion exceeds `MAX_DECODED_UNITS` or the
/// expanded units do not form valid UTF-16, the input is returned unchanged
/// so the frame degrades into a parse rejection downstream.
pub fn decode(input: &str) -> String {
    let units: Vec<u16> = input.encode_utf16().collect();
    let Some(expanded) = expand(&units) else {
        tracing::debug!(len = units.len(), limit = MAX_DECODED_UNITS, "Decoded frame too large, passing frame through");
        return input.to_string();
    };

    match String::from_utf16(&expanded) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(error = %e, len = units.len(), "Decode produced invalid UTF-16, passing frame through");
            input.to_string()
        }
    }
}

/// Run the dictionary expansion over raw code units.
///
/// `None` once the output would grow past [`MAX_DECODED_UNITS`].
fn expand(codes: &[u16]) -> Option<Vec<u16>> {
    let Some((&first, rest)) = codes.split_first() else {
        return Some(Vec::new());
    };

    // dict[i] holds the phrase for code FIRST_DICT_CODE + i
    let mut dict: Vec<Vec<u16>> = Vec::new();
    let mut previous: Vec<u16> = vec![first];
    let mut out: Vec<u16> = Vec::with_capacity(codes.len() * 2);
    out.push(first);

    for &unit in rest {
        let code = u32::from(unit);

        let phrase = if code < FIRST_DICT_CODE {
            vec![unit]
        } else {
            match dict.get((code - FIRST_DICT_CODE) as usize) {
                Some(entry) => entry.clone(),
                None => {
                    let mut p = previous.clone();
                    p.push(previous[0]);
                    p
                }
            }
        };

        if out.len() + phrase.len() > MAX_DECODED_UNITS {
            return None;
        }
        out.extend_from_slice(&phrase);

        let mut entry = previous;
        entry.push(phrase[0]);
        dict.push(entry);

        previous = phrase;
    }

    Some(out)
}
