use chess::{Board, Color, Piece, Square};

use crate::search::Rating;

/// Material value of a piece in centipawns.
#[inline(always)]
pub fn piece_value(piece: Piece) -> Rating {
    match piece {
        Piece::Pawn => 100,
        Piece::Knight => 320,
        Piece::Bishop => 330,
        Piece::Rook => 500,
        Piece::Queen => 900,
        Piece::King => 20_000,
    }
}

const MATERIAL: [(Piece, Rating); 5] = [
    (Piece::Pawn, 100),
    (Piece::Knight, 320),
    (Piece::Bishop, 330),
    (Piece::Rook, 500),
    (Piece::Queen, 900),
];

/// Static rating of a position, White-positive.
///
/// Material plus a light placement term; the search core only needs a
/// cheap, deterministic heuristic for leaves and cancelled nodes.
pub fn evaluate(board: &Board) -> Rating {
    let mut score = 0;

    for color in [Color::White, Color::Black] {
        let sign = if color == Color::White { 1 } else { -1 };
        let ours = *board.color_combined(color);

        for &(piece, value) in &MATERIAL {
            let bb = *board.pieces(piece) & ours;
            for square in bb {
                score += sign * (value + placement_bonus(piece, square, color));
            }
        }
    }

    // tempo
    if board.side_to_move() == Color::White {
        score += 10;
    } else {
        score -= 10;
    }

    score
}

fn placement_bonus(piece: Piece, square: Square, color: Color) -> Rating {
    match piece {
        // minor pieces like the middle of the board
        Piece::Knight | Piece::Bishop => 12 - 4 * center_distance(square),
        // pawns gain as they advance
        Piece::Pawn => {
            let rank = square.get_rank().to_index() as Rating;
            let steps = match color {
                Color::White => rank - 1,
                Color::Black => 6 - rank,
            };
            4 * steps.max(0)
        }
        _ => 0,
    }
}

/// Chebyshev distance from the four center squares, 0..=3.
fn center_distance(square: Square) -> Rating {
    let file = square.get_file().to_index() as Rating;
    let rank = square.get_rank().to_index() as Rating;
    let df = (2 * file - 7).abs() / 2;
    let dr = (2 * rank - 7).abs() / 2;
    df.max(dr)
}
