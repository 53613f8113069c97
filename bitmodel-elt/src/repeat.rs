//! Repetition loop shared by `Array` and `Sequence`

use bitmodel_core::{BitCursor, EltError, EltResult};
use log::debug;
use serde::{Deserialize, Serialize};

/// How an open-ended repetition reacts to a cursor fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RepeatPolicy {
    /// Rewind to the start of the failed repetition and stop, keeping what
    /// was decoded so far
    #[default]
    Lenient,
    /// Stop only once the visible window is exhausted, propagate any fault
    Strict,
}

/// Run `step` `count` times, or until the window is exhausted when `count`
/// is `None`
///
/// An open-ended loop also stops on a repetition that consumes no bits; its
/// result is discarded.
pub(crate) fn decode_repeated<'c, T, F>(
    name: &str,
    cur: &mut BitCursor<'c>,
    count: Option<usize>,
    policy: RepeatPolicy,
    mut step: F,
) -> EltResult<Vec<T>>
where
    F: FnMut(&mut BitCursor<'c>, usize) -> EltResult<T>,
{
    let mut out = Vec::new();
    if let Some(count) = count {
        out.reserve(count);
        for i in 0..count {
            out.push(step(cur, i)?);
        }
        return Ok(out);
    }

    loop {
        if cur.remaining() == 0 {
            debug!("{}: window exhausted after {} repetitions", name, out.len());
            break;
        }
        let start = cur.position();
        match step(cur, out.len()) {
            Ok(_) if cur.position() == start => {
                debug!("{}: empty repetition at bit {}, stopping", name, start);
                break;
            }
            Ok(item) => out.push(item),
            Err(EltError::Cursor(err)) if policy == RepeatPolicy::Lenient => {
                cur.rewind_to(start)?;
                debug!(
                    "{}: stopped after {} repetitions at bit {}: {}",
                    name,
                    out.len(),
                    start,
                    err
                );
                break;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitmodel_core::CursorError;

    fn read_u8s(
        buf: &[u8],
        count: Option<usize>,
        policy: RepeatPolicy,
    ) -> (EltResult<Vec<u64>>, usize) {
        let mut cur = BitCursor::new(buf);
        let res = decode_repeated("x", &mut cur, count, policy, |cur, _| {
            Ok(cur.read_uint(8)?)
        });
        (res, cur.position())
    }

    #[test]
    fn test_counted() {
        let (res, pos) = read_u8s(&[1, 2, 3], Some(2), RepeatPolicy::Lenient);
        assert_eq!(res.unwrap(), vec![1, 2]);
        assert_eq!(pos, 16);

        let (res, _) = read_u8s(&[1], Some(2), RepeatPolicy::Lenient);
        assert!(matches!(res, Err(EltError::Cursor(CursorError::OutOfBounds { .. }))));
    }

    #[test]
    fn test_open_ended_until_exhausted() {
        let (res, pos) = read_u8s(&[1, 2, 3], None, RepeatPolicy::Strict);
        assert_eq!(res.unwrap(), vec![1, 2, 3]);
        assert_eq!(pos, 24);
    }

    #[test]
    fn test_lenient_rewinds_partial_repetition() {
        let mut cur = BitCursor::new(&[1, 2, 3]);
        let res = decode_repeated("x", &mut cur, None, RepeatPolicy::Lenient, |cur, _| {
            Ok(cur.read_uint(16)?)
        });
        assert_eq!(res.unwrap(), vec![0x0102]);
        assert_eq!(cur.position(), 16);
    }

    #[test]
    fn test_strict_propagates() {
        let mut cur = BitCursor::new(&[1, 2, 3]);
        let res = decode_repeated("x", &mut cur, None, RepeatPolicy::Strict, |cur, _| {
            Ok(cur.read_uint(16)?)
        });
        assert!(res.is_err());
    }

    #[test]
    fn test_empty_repetition_stops() {
        let mut cur = BitCursor::new(&[1, 2]);
        let res = decode_repeated("x", &mut cur, None, RepeatPolicy::Lenient, |cur, _| {
            Ok(cur.read_uint(0)?)
        });
        assert!(res.unwrap().is_empty());
        assert_eq!(cur.position(), 0);
    }

    #[test]
    fn test_other_faults_propagate() {
        let mut cur = BitCursor::new(&[1, 2]);
        let res: EltResult<Vec<u64>> =
            decode_repeated("x", &mut cur, None, RepeatPolicy::Lenient, |_, _| {
                Err(EltError::contract("x", "decode", "bad"))
            });
        assert!(matches!(res, Err(EltError::Contract { .. })));
    }
}
