use chess::{Board, ChessMove, Piece, Square};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::search::Rating;

// Pack layout (64 bits):
// - Tag (16 bits, high hash bits)
// - Rating (16 bits, signed)
// - BestMove (16 bits)
// - Depth (8 bits)
// - Bound (2 bits)

/// How a stored rating relates to the true minimax value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Bound {
    InWindow = 0,
    LowerBound = 1,
    UpperBound = 2,
}

/// One cached search result.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionEntry {
    pub best_move: Option<ChessMove>,
    pub rating: Rating,
    /// Remaining depth the result was searched to. Only a cutoff candidate
    /// when it is at least the prober's remaining depth; shallower entries
    /// still serve as PV hints.
    pub depth: u8,
    pub bound: Bound,
}

/// Shared transposition table.
///
/// Each slot is a single `AtomicU64`, so readers can never observe a torn
/// entry. Always-replace on collision; every probe is validated against a
/// 16-bit tag and the legality of the stored move, so a stale or colliding
/// entry degrades to a miss.
pub struct TranspositionTable {
    table: Vec<AtomicU64>,
    mask: usize,
}

impl TranspositionTable {
    pub fn new(size_mb: usize) -> Self {
        let size_bytes = size_mb * 1024 * 1024;
        let num_entries = (size_bytes / 8).next_power_of_two();
        let mut table = Vec::with_capacity(num_entries);
        for _ in 0..num_entries {
            table.push(AtomicU64::new(0));
        }
        Self {
            table,
            mask: num_entries - 1,
        }
    }

    pub fn clear(&self) {
        for entry in &self.table {
            entry.store(0, Ordering::Relaxed);
        }
    }

    pub fn store(&self, board: &Board, entry: PositionEntry) {
        let hash = board.get_hash();
        let index = (hash as usize) & self.mask;
        self.table[index].store(Self::pack(hash, &entry), Ordering::Relaxed);
    }

    /// Looks up the entry for this position. Depth sufficiency is the
    /// caller's check; a shallow entry is still useful as a PV hint.
    pub fn probe(&self, board: &Board) -> Option<PositionEntry> {
        let hash = board.get_hash();
        let index = (hash as usize) & self.mask;
        let data = self.table[index].load(Ordering::Relaxed);
        if data == 0 {
            return None;
        }

        let (tag, entry) = Self::unpack(data);
        if tag != Self::tag(hash) {
            return None; // collision
        }
        if let Some(mv) = entry.best_move {
            // the tag is only 16 bits; an illegal move exposes a collision
            if !board.legal(mv) {
                return None;
            }
        }

        Some(entry)
    }

    fn tag(hash: u64) -> u16 {
        // the index consumes the low bits, so discriminate with the high ones
        (hash >> 48) as u16
    }

    fn pack(hash: u64, entry: &PositionEntry) -> u64 {
        let tag_part = Self::tag(hash) as u64;
        let rating_part = (entry.rating as i16 as u16) as u64;
        let move_part = entry.best_move.map_or(0, Self::encode_move) as u64;
        let depth_part = entry.depth as u64;
        let bound_part = entry.bound as u64;

        // Layout: [Bound:2][Depth:8][Move:16][Rating:16][Tag:16]
        (bound_part << 56) | (depth_part << 48) | (move_part << 32) | (rating_part << 16) | tag_part
    }

    fn unpack(data: u64) -> (u16, PositionEntry) {
        let tag = (data & 0xFFFF) as u16;
        let rating = ((data >> 16) & 0xFFFF) as u16 as i16 as Rating;
        let move_part = ((data >> 32) & 0xFFFF) as u16;
        let depth = ((data >> 48) & 0xFF) as u8;
        let bound = match (data >> 56) & 0x3 {
            1 => Bound::LowerBound,
            2 => Bound::UpperBound,
            _ => Bound::InWindow,
        };

        let best_move = if move_part != 0 {
            Some(Self::decode_move(move_part))
        } else {
            None
        };

        (
            tag,
            PositionEntry {
                best_move,
                rating,
                depth,
                bound,
            },
        )
    }

    fn encode_move(mv: ChessMove) -> u16 {
        let src = mv.get_source().to_index() as u16;
        let dst = mv.get_dest().to_index() as u16;
        let promo = match mv.get_promotion() {
            Some(Piece::Knight) => 1,
            Some(Piece::Bishop) => 2,
            Some(Piece::Rook) => 3,
            Some(Piece::Queen) => 4,
            _ => 0,
        };

        (promo << 12) | (dst << 6) | src
    }

    fn decode_move(val: u16) -> ChessMove {
        let src = unsafe {
            // SAFETY: val & 0x3F is always 0-63, valid for Square
            Square::new((val & 0x3F) as u8)
        };
        let dst = unsafe {
            // SAFETY: (val >> 6) & 0x3F is always 0-63, valid for Square
            Square::new(((val >> 6) & 0x3F) as u8)
        };
        let promo = match (val >> 12) & 0x7 {
            1 => Some(Piece::Knight),
            2 => Some(Piece::Bishop),
            3 => Some(Piece::Rook),
            4 => Some(Piece::Queen),
            _ => None,
        };
        ChessMove::new(src, dst, promo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arbitrary_entry() -> impl Strategy<Value = PositionEntry> {
        (
            any::<Option<(u8, u8, u8)>>(),
            -(crate::search::INFINITY)..=crate::search::INFINITY,
            any::<u8>(),
            0u8..3,
        )
            .prop_map(|(mv, rating, depth, bound)| PositionEntry {
                best_move: mv.map(|(src, dst, promo)| {
                    let src = unsafe { Square::new(src % 64) };
                    let dst = unsafe { Square::new(dst % 64) };
                    let promo = match promo % 5 {
                        1 => Some(Piece::Knight),
                        2 => Some(Piece::Bishop),
                        3 => Some(Piece::Rook),
                        4 => Some(Piece::Queen),
                        _ => None,
                    };
                    ChessMove::new(src, dst, promo)
                }),
                rating,
                depth,
                bound: match bound {
                    1 => Bound::LowerBound,
                    2 => Bound::UpperBound,
                    _ => Bound::InWindow,
                },
            })
    }

    proptest! {
        #[test]
        fn pack_unpack_round_trips(entry in arbitrary_entry()) {
            let hash = 0xfeed_f00d_dead_beefu64;
            let (tag, unpacked) = TranspositionTable::unpack(TranspositionTable::pack(hash, &entry));
            prop_assert_eq!(tag, TranspositionTable::tag(hash));
            prop_assert_eq!(unpacked.rating, entry.rating);
            prop_assert_eq!(unpacked.depth, entry.depth);
            prop_assert_eq!(unpacked.bound, entry.bound);
            // a1a1 without promotion encodes as the null move; all real moves survive
            if entry.best_move.map_or(true, |m| TranspositionTable::encode_move(m) != 0) {
                prop_assert_eq!(unpacked.best_move, entry.best_move);
            }
        }
    }
}
