use chess::{Board, ChessMove, Piece, Square};
use kestrel_engine::search::tt::{Bound, PositionEntry, TranspositionTable};
use std::str::FromStr;

#[test]
fn store_then_probe_round_trips() {
    let tt = TranspositionTable::new(1);
    let board = Board::default();
    let entry = PositionEntry {
        best_move: Some(ChessMove::new(Square::E2, Square::E4, None)),
        rating: 42,
        depth: 5,
        bound: Bound::InWindow,
    };

    tt.store(&board, entry);
    let got = tt.probe(&board).expect("entry should be found");
    assert_eq!(got, entry);
}

#[test]
fn zero_size_table_still_stores_one_entry() {
    let tt = TranspositionTable::new(0);
    let board = Board::default();
    let entry = PositionEntry {
        best_move: None,
        rating: -180,
        depth: 3,
        bound: Bound::LowerBound,
    };

    tt.store(&board, entry);
    let got = tt.probe(&board).expect("entry should be found");
    assert_eq!(got.rating, -180);
    assert_eq!(got.depth, 3);
}

#[test]
fn probing_an_unknown_position_misses() {
    let tt = TranspositionTable::new(1);
    let board = Board::default();
    let other = board.make_move_new(ChessMove::new(Square::E2, Square::E4, None));

    tt.store(
        &board,
        PositionEntry {
            best_move: Some(ChessMove::new(Square::E2, Square::E4, None)),
            rating: 10,
            depth: 2,
            bound: Bound::InWindow,
        },
    );

    assert!(tt.probe(&other).is_none());
}

#[test]
fn clear_empties_the_table() {
    let tt = TranspositionTable::new(1);
    let board = Board::default();
    tt.store(
        &board,
        PositionEntry {
            best_move: None,
            rating: 10,
            depth: 2,
            bound: Bound::LowerBound,
        },
    );

    assert!(tt.probe(&board).is_some());
    tt.clear();
    assert!(tt.probe(&board).is_none());
}

#[test]
fn all_bounds_round_trip() {
    let tt = TranspositionTable::new(1);
    let board = Board::default();

    for bound in [Bound::InWindow, Bound::LowerBound, Bound::UpperBound] {
        let entry = PositionEntry {
            best_move: None,
            rating: -200,
            depth: 5,
            bound,
        };
        tt.store(&board, entry);
        let got = tt.probe(&board).expect("entry should be found");
        assert_eq!(got.bound, bound);
        assert_eq!(got.rating, -200);
    }
}

#[test]
fn promotion_moves_round_trip() {
    let tt = TranspositionTable::new(1);
    let board = Board::from_str("8/5P1k/8/8/8/8/8/6K1 w - - 0 1").unwrap();
    let promotion = ChessMove::new(Square::F7, Square::F8, Some(Piece::Queen));

    tt.store(
        &board,
        PositionEntry {
            best_move: Some(promotion),
            rating: 850,
            depth: 4,
            bound: Bound::InWindow,
        },
    );

    let got = tt.probe(&board).expect("entry should be found");
    assert_eq!(got.best_move, Some(promotion));
}

#[test]
fn shallow_entries_still_come_back_as_hints() {
    // depth sufficiency is the caller's check; a shallow entry is returned
    // so its move can seed the ordering
    let tt = TranspositionTable::new(1);
    let board = Board::default();
    tt.store(
        &board,
        PositionEntry {
            best_move: Some(ChessMove::new(Square::G1, Square::F3, None)),
            rating: 25,
            depth: 1,
            bound: Bound::InWindow,
        },
    );

    let got = tt.probe(&board).expect("entry should be found");
    assert_eq!(got.depth, 1);
}

#[test]
fn stored_moves_are_always_legal_for_the_prober() {
    // an entry whose move is not legal in the probed position is treated as
    // a collision and dropped
    let tt = TranspositionTable::new(0); // a single slot, so every store collides
    let board = Board::default();
    let after_e4 = board.make_move_new(ChessMove::new(Square::E2, Square::E4, None));

    tt.store(
        &board,
        PositionEntry {
            best_move: Some(ChessMove::new(Square::E2, Square::E4, None)),
            rating: 10,
            depth: 2,
            bound: Bound::InWindow,
        },
    );

    if let Some(entry) = tt.probe(&after_e4) {
        let mv = entry.best_move.expect("stored move");
        assert!(after_e4.legal(mv));
    }
}
