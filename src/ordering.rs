//! Chapter reordering.
//!
//! Chapters move one position at a time. Numbers stay unique within a
//! story: moving onto an occupied number is a swap and needs explicit
//! confirmation. Gaps in the sequence are allowed and never closed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lowest chapter number a chapter may hold.
pub const MIN_CHAPTER_NUMBER: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// A chapter's identity and current number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSlot {
    pub id: Uuid,
    pub chapter_number: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovePlan {
    /// Target number is free.
    Renumber { id: Uuid, to: i32 },
    /// Target number is taken; both chapters exchange numbers.
    Swap { mover: ChapterSlot, other: ChapterSlot },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoveRejection {
    #[error("Chapter number cannot be lower than {MIN_CHAPTER_NUMBER}")]
    BelowMinimum,

    #[error("Chapter number is out of range")]
    OutOfRange,

    #[error("Chapter number {target} is already taken; confirm to swap the two chapters")]
    NeedsSwapConfirmation { target: i32, occupant: ChapterSlot },
}

/// Number a chapter would take after one step in `direction`.
pub fn target_number(current: i32, direction: Direction) -> Result<i32, MoveRejection> {
    let target = match direction {
        Direction::Up => current.checked_sub(1),
        Direction::Down => current.checked_add(1),
    }
    .ok_or(MoveRejection::OutOfRange)?;

    if target < MIN_CHAPTER_NUMBER {
        return Err(MoveRejection::BelowMinimum);
    }
    Ok(target)
}

/// Decide how to move `mover` one step. `occupant` is the other chapter of
/// the same story currently holding the target number, if any.
pub fn plan_move(
    mover: ChapterSlot,
    direction: Direction,
    occupant: Option<ChapterSlot>,
    confirm_swap: bool,
) -> Result<MovePlan, MoveRejection> {
    let target = target_number(mover.chapter_number, direction)?;

    match occupant {
        Some(other) if other.id != mover.id => {
            debug_assert_eq!(other.chapter_number, target);
            if !confirm_swap {
                return Err(MoveRejection::NeedsSwapConfirmation {
                    target,
                    occupant: other,
                });
            }
            Ok(MovePlan::Swap {
                mover: ChapterSlot {
                    id: mover.id,
                    chapter_number: target,
                },
                other: ChapterSlot {
                    id: other.id,
                    chapter_number: mover.chapter_number,
                },
            })
        }
        _ => Ok(MovePlan::Renumber {
            id: mover.id,
            to: target,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(n: i32) -> ChapterSlot {
        ChapterSlot {
            id: Uuid::new_v4(),
            chapter_number: n,
        }
    }

    #[test]
    fn test_up_decrements_and_down_increments() {
        assert_eq!(target_number(3, Direction::Up), Ok(2));
        assert_eq!(target_number(3, Direction::Down), Ok(4));
    }

    #[test]
    fn test_cannot_move_first_chapter_up() {
        assert_eq!(target_number(1, Direction::Up), Err(MoveRejection::BelowMinimum));
        assert_eq!(
            plan_move(slot(1), Direction::Up, None, true),
            Err(MoveRejection::BelowMinimum)
        );
    }

    #[test]
    fn test_overflow_is_rejected() {
        assert_eq!(
            target_number(i32::MAX, Direction::Down),
            Err(MoveRejection::OutOfRange)
        );
    }

    #[test]
    fn test_free_target_renumbers_single_chapter() {
        let mover = slot(3);
        assert_eq!(
            plan_move(mover, Direction::Down, None, false),
            Ok(MovePlan::Renumber {
                id: mover.id,
                to: 4
            })
        );
    }

    #[test]
    fn test_occupied_target_without_confirmation_is_rejected() {
        let mover = slot(3);
        let occupant = slot(4);
        let err = plan_move(mover, Direction::Down, Some(occupant), false).unwrap_err();
        assert_eq!(
            err,
            MoveRejection::NeedsSwapConfirmation {
                target: 4,
                occupant
            }
        );
        assert!(err.to_string().contains("already taken"));
    }

    #[test]
    fn test_occupied_target_with_confirmation_swaps_numbers() {
        let mover = slot(3);
        let occupant = slot(4);
        match plan_move(mover, Direction::Down, Some(occupant), true).unwrap() {
            MovePlan::Swap { mover: m, other } => {
                assert_eq!(m.id, mover.id);
                assert_eq!(m.chapter_number, 4);
                assert_eq!(other.id, occupant.id);
                assert_eq!(other.chapter_number, 3);
            }
            plan => panic!("expected swap, got {:?}", plan),
        }
    }

    #[test]
    fn test_swap_keeps_numbers_unique() {
        let mut chapters = vec![slot(1), slot(2), slot(3), slot(5)];
        let mover = chapters[1];
        let occupant = chapters[0];

        if let MovePlan::Swap { mover: m, other } =
            plan_move(mover, Direction::Up, Some(occupant), true).unwrap()
        {
            for c in chapters.iter_mut() {
                if c.id == m.id {
                    c.chapter_number = m.chapter_number;
                } else if c.id == other.id {
                    c.chapter_number = other.chapter_number;
                }
            }
        }

        let mut numbers: Vec<i32> = chapters.iter().map(|c| c.chapter_number).collect();
        numbers.sort();
        assert_eq!(numbers, vec![1, 2, 3, 5]);
        assert_eq!(chapters[1].chapter_number, 1);
        assert_eq!(chapters[0].chapter_number, 2);
    }

    #[test]
    fn test_gaps_are_left_alone() {
        let mover = slot(3);
        assert_eq!(
            plan_move(mover, Direction::Down, None, false),
            Ok(MovePlan::Renumber {
                id: mover.id,
                to: 4
            })
        );
    }

    #[test]
    fn test_direction_deserializes_lowercase() {
        let d: Direction = serde_json::from_str("\"down\"").unwrap();
        assert_eq!(d, Direction::Down);
    }
}
