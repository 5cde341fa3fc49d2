use chess::{Board, ChessMove, Color};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::repetition::RepetitionMap;
use crate::search::node::Node;
use crate::search::ordering::{self, MovePriority};
use crate::search::tt::{Bound, PositionEntry, TranspositionTable};
use crate::search::{
    checkmated_rating, worst_rating, AlphaBeta, MoveRating, Rating, MAX_DEPTH, MAX_KILLER_MOVES,
    RANDOMIZATION_CUTOFF,
};

/// Ring buffer of quiet moves that recently caused a cutoff at one level.
#[derive(Clone, Copy, Default)]
struct KillerMoves {
    moves: [Option<ChessMove>; MAX_KILLER_MOVES],
    index: usize,
}

impl KillerMoves {
    fn insert(&mut self, mv: ChessMove) {
        self.moves[self.index] = Some(mv);
        self.index = if self.index + 1 == MAX_KILLER_MOVES {
            0
        } else {
            self.index + 1
        };
    }
}

/// Reusable `MovePriority` buffers, one in flight per recursion level.
/// Drained between iterative-deepening iterations and before each dispatch
/// so no stale capacity outlives a search.
#[derive(Default)]
struct PriorityBuffers {
    free: Vec<Vec<MovePriority>>,
}

impl PriorityBuffers {
    fn acquire(&mut self) -> Vec<MovePriority> {
        self.free.pop().unwrap_or_default()
    }

    fn release(&mut self, mut buffer: Vec<MovePriority>) {
        buffer.clear();
        self.free.push(buffer);
    }

    fn reset(&mut self) {
        self.free.clear();
    }
}

/// One search thread's worth of alpha-beta state.
///
/// The main worker searches deterministically; helpers shuffle their move
/// ordering near the root so the voting pool sees genuinely different lines.
pub struct Worker {
    tt: Arc<TranspositionTable>,
    stop: Arc<AtomicBool>,
    rng: StdRng,
    helper: bool,
    /// Target depth for the next dispatch, assigned by the coordinator.
    pub depth: u8,
    killers: [KillerMoves; MAX_DEPTH],
    buffers: PriorityBuffers,
    /// Game history plus the positions on the current search path.
    path: RepetitionMap,
}

impl Worker {
    pub(crate) fn new(helper: bool, tt: Arc<TranspositionTable>, stop: Arc<AtomicBool>) -> Self {
        Self {
            tt,
            stop,
            rng: StdRng::from_entropy(),
            helper,
            depth: 0,
            killers: [KillerMoves::default(); MAX_DEPTH],
            buffers: PriorityBuffers::default(),
            path: RepetitionMap::new(),
        }
    }

    pub fn is_helper(&self) -> bool {
        self.helper
    }

    pub(crate) fn reset_arena(&mut self) {
        self.buffers.reset();
    }

    /// Searches the position to the configured depth and returns the best
    /// move with its rating.
    pub fn search(&mut self, board: &Board, repetition: &RepetitionMap) -> MoveRating {
        self.path = repetition.clone();
        let maximizing = board.side_to_move() == Color::White;
        self.iterative_deepening(maximizing, board)
    }

    fn iterative_deepening(&mut self, maximizing: bool, board: &Board) -> MoveRating {
        for depth in 1..self.depth {
            self.buffers.reset();
            self.root_search(maximizing, board, depth);
        }
        self.buffers.reset();
        self.root_search(maximizing, board, self.depth)
    }

    fn root_search(&mut self, maximizing: bool, board: &Board, depth: u8) -> MoveRating {
        let root = Node::root(*board, depth);
        self.try_short_circuit(maximizing, &root, AlphaBeta::default())
    }

    fn try_short_circuit(
        &mut self,
        maximizing: bool,
        node: &Node,
        mut window: AlphaBeta,
    ) -> MoveRating {
        if node.legal_moves().len() == 0 {
            let mut result = MoveRating::default();
            if node.in_check() {
                result.rating = checkmated_rating(maximizing);
                result.checkmate_level = Some(node.level());
            }
            return result;
        }

        if self.path.count(node.board()) >= 3 {
            return MoveRating {
                mv: None,
                rating: 0,
                invalid_tt_entry: true,
                checkmate_level: None,
            };
        }

        if self.stop.load(Ordering::Relaxed) {
            return MoveRating {
                rating: node.heuristic_rating(),
                ..MoveRating::default()
            };
        }

        let mut pv_move = None;

        // a helper's root must not collapse onto the shared answer; it may
        // still store on the way back
        let can_use_entry = !(self.helper && node.level() == 0);

        if !self.stop.load(Ordering::Relaxed) && can_use_entry {
            if let Some(entry) = self.tt.probe(node.board()) {
                pv_move = entry.best_move;

                let repeats = entry
                    .best_move
                    .map_or(false, |mv| self.would_make_repetition(node.board(), mv));
                if !repeats && entry.depth >= node.remaining_depth() {
                    match entry.bound {
                        Bound::InWindow => return Self::entry_result(&entry),
                        Bound::LowerBound => {
                            if entry.rating >= window.beta() {
                                return Self::entry_result(&entry);
                            }
                            window.raise_alpha(entry.rating);
                        }
                        Bound::UpperBound => {
                            if entry.rating <= window.alpha() {
                                return Self::entry_result(&entry);
                            }
                            window.lower_beta(entry.rating);
                        }
                    }
                }
            }
        }

        if node.is_done() {
            // never reached at the root, so the null move is safe here
            return MoveRating {
                rating: node.heuristic_rating(),
                ..MoveRating::default()
            };
        }

        self.best_child_position(maximizing, node, pv_move, window)
    }

    fn entry_result(entry: &PositionEntry) -> MoveRating {
        MoveRating {
            mv: entry.best_move,
            rating: entry.rating,
            invalid_tt_entry: false,
            checkmate_level: None,
        }
    }

    fn would_make_repetition(&self, board: &Board, mv: ChessMove) -> bool {
        let child = board.make_move_new(mv);
        // add 1 since this position has not been pushed yet; a second
        // occurrence already lets the opponent steer into the threefold
        self.path.count(&child) + 1 >= 2
    }

    fn best_child_position(
        &mut self,
        maximizing: bool,
        node: &Node,
        pv_move: Option<ChessMove>,
        mut window: AlphaBeta,
    ) -> MoveRating {
        let original_window = window;

        let killer_snapshot = self.killers[node.level() as usize].moves;
        let mut priorities = self.buffers.acquire();
        ordering::move_priorities(node, pv_move, &killer_snapshot, &mut priorities);
        if self.helper && node.level() < RANDOMIZATION_CUTOFF {
            priorities.shuffle(&mut self.rng);
        }

        let mut best = MoveRating {
            mv: None,
            rating: worst_rating(maximizing),
            invalid_tt_entry: false,
            checkmate_level: None,
        };
        let mut bound = Bound::InWindow;
        let mut did_not_prune = true;

        for i in 0..priorities.len() {
            let priority = priorities[i];
            let child = node.child(priority.mv(), priority.recommended_depth());
            self.path.push(child.board());
            let mut child_rating = self.try_short_circuit(!maximizing, &child, window);

            // a trimmed move may only be chosen after confirming at full depth
            if priority.is_trimmed() {
                let may_choose = if maximizing {
                    child_rating.rating >= window.alpha()
                } else {
                    child_rating.rating <= window.beta()
                };
                if may_choose {
                    let full_child = node.child(priority.mv(), node.remaining_depth() - 1);
                    child_rating = self.try_short_circuit(!maximizing, &full_child, window);
                }
            }
            self.path.pop(child.board());

            let improved = if maximizing {
                child_rating.rating > best.rating
            } else {
                child_rating.rating < best.rating
            };
            if improved {
                best = child_rating;
                best.mv = Some(priority.mv());
            }

            window.update(maximizing, best.rating);
            if window.can_prune() {
                if priority.captured().is_none() {
                    self.killers[node.level() as usize].insert(priority.mv());
                }
                bound = if maximizing {
                    Bound::LowerBound
                } else {
                    Bound::UpperBound
                };
                did_not_prune = false;
                break;
            }

            // immediate mate for the side to move; nothing can beat it
            if child_rating.rating == checkmated_rating(!maximizing) {
                break;
            }
        }

        if did_not_prune {
            if maximizing {
                if best.rating <= original_window.alpha() {
                    bound = Bound::UpperBound;
                }
            } else if best.rating >= original_window.beta() {
                bound = Bound::LowerBound;
            }
        }

        if !best.invalid_tt_entry {
            self.tt.store(
                node.board(),
                PositionEntry {
                    best_move: best.mv,
                    rating: best.rating,
                    depth: node.remaining_depth(),
                    bound,
                },
            );
        }

        // the repetition flag stops here; stop requests are re-checked anyway
        best.invalid_tt_entry = false;
        self.buffers.release(priorities);
        best
    }

    /// Weight of this worker's answer in the coordinator's vote.
    pub(crate) fn voting_weight(
        &self,
        result: &MoveRating,
        worst_score: Rating,
        max_score_diff: Rating,
    ) -> f64 {
        debug_assert!(max_score_diff >= 0);

        let mut weight = 1.0 + 2f64.powi(self.depth as i32);

        // up to 20% boost depending on how good the score is
        if max_score_diff != 0 {
            weight *= 1.2 * ((result.rating - worst_score) as f64) / (max_score_diff as f64);
        }

        if let Some(level) = result.checkmate_level {
            weight += weight / level as f64;
        }

        weight
    }
}
