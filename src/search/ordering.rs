use chess::{
    between, get_bishop_moves, get_king_moves, get_knight_moves, get_pawn_attacks, get_rook_moves,
    BitBoard, Board, ChessMove, Piece, Square, EMPTY,
};
use std::sync::LazyLock;

use crate::eval::piece_value;
use crate::search::node::Node;
use crate::search::{sub_to_min, Rating, MAX_KILLER_MOVES, MAX_MOVE_COUNT};

const LMR_DIVISOR: f64 = 3.14;
// literal round-up bias; flooring after adding it rounds the quotient up
const LMR_ROUND_UP_BIAS: f64 = 0.99;

// LOG2[i] = log2(i + 1), indexed by move index or depth
static LOG2: LazyLock<[f64; MAX_MOVE_COUNT]> = LazyLock::new(|| {
    let mut table = [0.0; MAX_MOVE_COUNT];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = ((i + 1) as f64).log2();
    }
    table
});

/// A ranked candidate move.
#[derive(Clone, Copy, Debug)]
pub struct MovePriority {
    mv: ChessMove,
    captured: Option<Piece>,
    exchange_rating: Rating,
    recommended_depth: u8,
    trimmed: bool,
}

impl MovePriority {
    fn new(board: &Board, mv: ChessMove, enemy_attacks: BitBoard, remaining_depth: u8) -> Self {
        let captured = captured_piece(board, mv);
        Self {
            mv,
            captured,
            exchange_rating: exchange_rating(board, mv, captured, enemy_attacks),
            recommended_depth: remaining_depth - 1,
            trimmed: false,
        }
    }

    pub fn mv(&self) -> ChessMove {
        self.mv
    }

    pub fn captured(&self) -> Option<Piece> {
        self.captured
    }

    pub fn exchange_rating(&self) -> Rating {
        self.exchange_rating
    }

    pub fn recommended_depth(&self) -> u8 {
        self.recommended_depth
    }

    pub fn is_trimmed(&self) -> bool {
        self.trimmed
    }

    /// Late-move reduction: lower the recommended depth for moves far down
    /// the ordering. The caller re-searches at full depth if the reduced
    /// result still lands in the window.
    fn trim(&mut self, index: usize, depth: u8) {
        let reduction = ((LOG2[depth as usize] * LOG2[index]) / LMR_DIVISOR + LMR_ROUND_UP_BIAS) as u8;
        if reduction > 0 {
            self.recommended_depth = sub_to_min(self.recommended_depth, reduction, 0);
            self.trimmed = true;
        }
    }
}

/// Builds the ordered candidate list for a node.
///
/// Phases, each working on the tail left by the previous one:
/// 1. sort by static exchange, best first
/// 2. the PV move, if present, is swapped to the very front
/// 3. for every threatened ally (most valuable first), captures and
///    evasions are stably pulled forward
/// 4. killer moves are pulled forward
/// The remaining tail gets its depth trimmed by LMR.
pub(crate) fn move_priorities(
    node: &Node,
    pv_move: Option<ChessMove>,
    killers: &[Option<ChessMove>; MAX_KILLER_MOVES],
    out: &mut Vec<MovePriority>,
) {
    debug_assert!(node.remaining_depth() > 0);

    let board = node.board();
    let enemy_attacks = enemy_attack_footprint(board);
    let remaining_depth = node.remaining_depth();

    out.clear();
    out.extend(
        node.legal_moves()
            .map(|mv| MovePriority::new(board, mv, enemy_attacks, remaining_depth)),
    );

    out.sort_unstable_by(|a, b| b.exchange_rating.cmp(&a.exchange_rating));

    let mut tail = front_pv_move(out, pv_move);
    tail += front_captures_and_evasions(board, enemy_attacks, &mut out[tail..]);
    tail += partition(&mut out[tail..], |priority| {
        killers.iter().any(|killer| *killer == Some(priority.mv))
    });

    if remaining_depth - 1 != 0 {
        let base_offset = tail;
        for (i, priority) in out[tail..].iter_mut().enumerate() {
            priority.trim(base_offset + i, remaining_depth);
        }
    }

    debug_assert!(!out.is_empty());
}

/// Swaps the PV move to the front; returns the number of moves fixed there.
fn front_pv_move(priorities: &mut [MovePriority], pv_move: Option<ChessMove>) -> usize {
    if let Some(pv) = pv_move {
        if let Some(at) = priorities.iter().position(|p| p.mv == pv) {
            priorities.swap(0, at);
            return 1;
        }
    }
    0
}

/// For each allied piece standing inside the enemy attack footprint, pulls
/// forward the moves that capture well enough or that land on an attacker or
/// its ray toward the threatened square. Returns the number of moves fixed.
fn front_captures_and_evasions(
    board: &Board,
    enemy_attacks: BitBoard,
    tail: &mut [MovePriority],
) -> usize {
    const MOST_VALUABLE_FIRST: [Piece; 5] = [
        Piece::Queen,
        Piece::Rook,
        Piece::Bishop,
        Piece::Knight,
        Piece::Pawn,
    ];

    let allies = *board.color_combined(board.side_to_move());
    let mut fixed = 0;

    for piece in MOST_VALUABLE_FIRST {
        let threatened = *board.pieces(piece) & allies & enemy_attacks;
        for square in threatened {
            let (attackers, rays) = attackers_to(board, square);
            let threshold = piece_value(piece);
            fixed += stable_partition(&mut tail[fixed..], |priority| {
                // a capture at least as valuable as the threatened piece
                // counts no matter where it lands
                priority.exchange_rating >= threshold
                    || BitBoard::from_square(priority.mv.get_dest()) & (attackers | rays) != EMPTY
            });
        }
    }

    fixed
}

/// Union of all squares the enemy attacks.
fn enemy_attack_footprint(board: &Board) -> BitBoard {
    let occupied = *board.combined();
    let enemy_color = !board.side_to_move();
    let enemies = *board.color_combined(enemy_color);

    let mut attacks = EMPTY;
    for square in *board.pieces(Piece::Pawn) & enemies {
        attacks |= get_pawn_attacks(square, enemy_color, !EMPTY);
    }
    for square in *board.pieces(Piece::Knight) & enemies {
        attacks |= get_knight_moves(square);
    }
    for square in (*board.pieces(Piece::Bishop) | *board.pieces(Piece::Queen)) & enemies {
        attacks |= get_bishop_moves(square, occupied);
    }
    for square in (*board.pieces(Piece::Rook) | *board.pieces(Piece::Queen)) & enemies {
        attacks |= get_rook_moves(square, occupied);
    }
    attacks |= get_king_moves(board.king_square(enemy_color));

    attacks
}

/// Enemy pieces attacking `target`, plus the ray squares of the sliders
/// among them (a blocking move is an evasion).
fn attackers_to(board: &Board, target: Square) -> (BitBoard, BitBoard) {
    let occupied = *board.combined();
    let enemy_color = !board.side_to_move();
    let enemies = *board.color_combined(enemy_color);

    let diagonal =
        get_bishop_moves(target, occupied) & (*board.pieces(Piece::Bishop) | *board.pieces(Piece::Queen)) & enemies;
    let orthogonal =
        get_rook_moves(target, occupied) & (*board.pieces(Piece::Rook) | *board.pieces(Piece::Queen)) & enemies;

    let mut attackers = diagonal | orthogonal;
    let mut rays = EMPTY;
    for square in diagonal | orthogonal {
        rays |= between(square, target);
    }

    attackers |= get_knight_moves(target) & *board.pieces(Piece::Knight) & enemies;
    attackers |= get_king_moves(target) & *board.pieces(Piece::King) & enemies;
    // a pawn of ours on the target square would attack exactly the enemy
    // pawns that attack the target
    attackers |=
        get_pawn_attacks(target, board.side_to_move(), *board.pieces(Piece::Pawn) & enemies);

    (attackers, rays)
}

fn captured_piece(board: &Board, mv: ChessMove) -> Option<Piece> {
    if let Some(piece) = board.piece_on(mv.get_dest()) {
        return Some(piece);
    }
    // en passant: the destination is empty but a pawn falls anyway
    if board.piece_on(mv.get_source()) == Some(Piece::Pawn)
        && mv.get_source().get_file() != mv.get_dest().get_file()
    {
        return Some(Piece::Pawn);
    }
    None
}

/// Static material swing of a move: what it wins, minus what it hangs when
/// the destination square is covered by the enemy.
fn exchange_rating(
    board: &Board,
    mv: ChessMove,
    captured: Option<Piece>,
    enemy_attacks: BitBoard,
) -> Rating {
    let mover = board.piece_on(mv.get_source()).unwrap_or(Piece::Pawn);
    let occupant_after = mv.get_promotion().unwrap_or(mover);

    let mut swing = captured.map_or(0, piece_value);
    if let Some(promotion) = mv.get_promotion() {
        swing += piece_value(promotion) - piece_value(Piece::Pawn);
    }
    if BitBoard::from_square(mv.get_dest()) & enemy_attacks != EMPTY {
        swing -= piece_value(occupant_after);
    }

    swing
}

/// Moves matching `pred` to the front, preserving relative order on both
/// sides. Returns the number of matches.
fn stable_partition<T: Copy>(slice: &mut [T], mut pred: impl FnMut(&T) -> bool) -> usize {
    let mut front = 0;
    for i in 0..slice.len() {
        if pred(&slice[i]) {
            let matching = slice[i];
            slice.copy_within(front..i, front + 1);
            slice[front] = matching;
            front += 1;
        }
    }
    front
}

/// Moves matching `pred` to the front without preserving order. Returns the
/// number of matches.
fn partition<T>(slice: &mut [T], mut pred: impl FnMut(&T) -> bool) -> usize {
    let mut front = 0;
    for i in 0..slice.len() {
        if pred(&slice[i]) {
            slice.swap(front, i);
            front += 1;
        }
    }
    front
}
