use chess::{Board, ChessMove};
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::repetition::RepetitionMap;
use crate::search::tt::TranspositionTable;
use crate::search::worker::Worker;
use crate::search::{MoveRating, Rating};

/// Lazy-SMP coordinator: every worker searches the same root over the shared
/// transposition table, diversified by shuffled orderings and staggered
/// depths, and the answers are combined by weighted vote.
pub struct ParallelSearch {
    stop: Arc<AtomicBool>,
    workers: Vec<Worker>,
}

impl ParallelSearch {
    pub fn new(tt: Arc<TranspositionTable>, threads: usize) -> Self {
        let threads = threads.max(1);
        let stop = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(threads);
        workers.push(Worker::new(false, Arc::clone(&tt), Arc::clone(&stop)));
        for _ in 1..threads {
            workers.push(Worker::new(true, Arc::clone(&tt), Arc::clone(&stop)));
        }

        Self { stop, workers }
    }

    /// One worker per hardware core.
    pub fn hardware_threads() -> usize {
        thread::available_parallelism().map_or(1, |n| n.get())
    }

    /// Shared cancellation flag; setting it makes every in-flight worker
    /// return promptly.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn cancel(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Lazy-SMP depth staggering: the main worker gets the full depth,
    /// helpers alternate between full and one less.
    fn assign_depths(&mut self, max_depth: u8) {
        assert!(max_depth >= 1);

        for (i, worker) in self.workers.iter_mut().enumerate() {
            worker.depth = if !worker.is_helper() || max_depth == 1 {
                max_depth
            } else if i % 2 == 1 {
                max_depth
            } else {
                max_depth - 1
            };
        }
    }

    /// Dispatches the search to every worker and combines the results.
    /// Returns `None` when the position is terminal or the search was
    /// cancelled before all workers finished.
    pub fn find_best_move(
        &mut self,
        board: &Board,
        depth: u8,
        repetition: &RepetitionMap,
    ) -> Option<ChessMove> {
        for worker in &mut self.workers {
            worker.reset_arena();
        }
        self.assign_depths(depth);
        self.stop.store(false, Ordering::Relaxed);

        debug!(
            "dispatching depth {} across {} workers",
            depth,
            self.workers.len()
        );

        let results: Vec<MoveRating> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .workers
                .iter_mut()
                .map(|worker| scope.spawn(move || worker.search(board, repetition)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        // null moves appear when a stop was requested or the position is
        // terminal; either way there is no committed answer
        if results.iter().any(|result| result.mv.is_none()) {
            return None;
        }

        vote_for_best_move(&self.workers, &results)
    }
}

fn vote_for_best_move(workers: &[Worker], results: &[MoveRating]) -> Option<ChessMove> {
    if results.iter().any(|result| result.checkmate_level.is_some()) {
        let quickest = results
            .iter()
            .min_by_key(|result| result.checkmate_level.unwrap_or(u8::MAX))?;
        if let Some(level) = quickest.checkmate_level {
            debug!("worker found checkmate {} plies from the root", level);
        }
        return quickest.mv;
    }

    let worst_score = results.iter().map(|result| result.rating).min()?;
    let best_score = results.iter().map(|result| result.rating).max()?;
    let max_score_diff: Rating = best_score - worst_score;

    let mut votes: HashMap<ChessMove, f64> = HashMap::new();
    let mut best_move = None;
    let mut best_vote = 0.0;

    for (result, worker) in results.iter().zip(workers) {
        let Some(mv) = result.mv else { continue };
        let vote = votes.entry(mv).or_insert(0.0);
        *vote += worker.voting_weight(result, worst_score, max_score_diff);
        // strict comparison: on equal votes the earlier-seen move stands
        if *vote > best_vote {
            best_vote = *vote;
            best_move = Some(mv);
        }
    }

    best_move
}
