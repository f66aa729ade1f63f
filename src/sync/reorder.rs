use thiserror::Error;

/// A single-element move: the item at `from` now sits at `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReorderError {
    #[error("order changed length from {before} to {after}")]
    LengthMismatch { before: usize, after: usize },

    #[error("position {index} holds a field that was not in the previous order")]
    UnknownField { index: usize },

    #[error("position {index} repeats a field")]
    Duplicate { index: usize },

    #[error("positions {first}..={last} are not a single-element rotation")]
    NotARotation { first: usize, last: usize },
}

/// Work out which single move turns `before` into `after`.
///
/// Returns `Ok(None)` when the order is unchanged. Anything other than one
/// element moved to a new position (with the elements in between shifted by
/// one) is rejected.
pub fn detect_move<T: PartialEq>(before: &[T], after: &[T]) -> Result<Option<Move>, ReorderError> {
    if before.len() != after.len() {
        return Err(ReorderError::LengthMismatch {
            before: before.len(),
            after: after.len(),
        });
    }

    // positions[i]: where the field now at i used to be.
    let mut positions = Vec::with_capacity(after.len());
    let mut seen = vec![false; before.len()];
    for (index, field) in after.iter().enumerate() {
        let previous = before
            .iter()
            .position(|candidate| candidate == field)
            .ok_or(ReorderError::UnknownField { index })?;
        if std::mem::replace(&mut seen[previous], true) {
            return Err(ReorderError::Duplicate { index });
        }
        positions.push(previous);
    }

    let displaced = |index: &usize| positions[*index] != *index;
    let Some(first) = (0..positions.len()).find(displaced) else {
        return Ok(None);
    };
    let last = (0..positions.len())
        .rev()
        .find(displaced)
        .unwrap_or(first);

    // Dragged forward: everything between slid back by one.
    if positions[last] == first && (first..last).all(|index| positions[index] == index + 1) {
        return Ok(Some(Move {
            from: first,
            to: last,
        }));
    }
    // Dragged backward: everything between slid forward by one.
    if positions[first] == last && (first + 1..=last).all(|index| positions[index] == index - 1) {
        return Ok(Some(Move {
            from: last,
            to: first,
        }));
    }

    Err(ReorderError::NotARotation { first, last })
}
