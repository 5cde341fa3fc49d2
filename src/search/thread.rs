use chess::Board;
use log::warn;
use parking_lot::{Condvar, Mutex};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::repetition::RepetitionMap;
use crate::search::lazy_smp::ParallelSearch;
use crate::search::MAX_PONDER_DEPTH;

/// Everything the search thread needs to answer a `go`.
#[derive(Clone)]
pub struct GameState {
    pub board: Board,
    pub repetition: RepetitionMap,
    pub depth: u8,
}

impl GameState {
    pub fn new(board: Board, repetition: RepetitionMap, depth: u8) -> Self {
        Self {
            board,
            repetition,
            depth,
        }
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            board: Board::default(),
            repetition: RepetitionMap::new(),
            depth: 1,
        }
    }
}

struct ControlState {
    game: GameState,
    should_ponder: bool,
    calculation_requested: bool,
}

struct Shared {
    control: Mutex<ControlState>,
    wakeup: Condvar,
    quit: AtomicBool,
}

/// A long-lived worker thread multiplexing three activities: pondering on
/// the opponent's time, computing a committed answer, and idling.
///
/// Commands only flip flags under the mutex, cancel any in-flight search and
/// notify; the thread itself decides what to do next.
pub struct SearchThread {
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SearchThread {
    /// Spawns the thread. Committed best moves are written to `sink`, one
    /// line per move, flushed after each.
    pub fn new(search: ParallelSearch, sink: Box<dyn Write + Send>) -> Self {
        let shared = Arc::new(Shared {
            control: Mutex::new(ControlState {
                game: GameState::default(),
                should_ponder: false,
                calculation_requested: false,
            }),
            wakeup: Condvar::new(),
            quit: AtomicBool::new(false),
        });

        let stop = search.stop_handle();
        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::spawn(move || run(thread_shared, search, sink));

        Self {
            shared,
            stop,
            handle: Some(handle),
        }
    }

    /// Installs a new game state and starts pondering on it.
    pub fn set_position(&self, state: GameState) {
        {
            let mut control = self.shared.control.lock();
            control.should_ponder = true;
            control.game = state;
        }
        self.cancel(); // in case we are searching
        self.shared.wakeup.notify_one();
    }

    /// Requests a committed answer at the given depth.
    pub fn go(&self, depth: u8) {
        {
            let mut control = self.shared.control.lock();
            control.calculation_requested = true;
            control.should_ponder = false;
            control.game.depth = depth;
        }
        self.cancel();
        self.shared.wakeup.notify_one();
    }

    /// Cancels whatever is running and idles.
    pub fn stop(&self) {
        self.cancel();
        self.shared.control.lock().should_ponder = false;
        self.shared.wakeup.notify_one();
    }

    pub fn shutdown(&mut self) {
        self.shared.quit.store(true, Ordering::Relaxed);
        self.cancel();
        self.shared.wakeup.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn cancel(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for SearchThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Ponder until shutdown or until a calculation is requested.
fn think(shared: &Shared, search: &mut ParallelSearch) {
    while !shared.quit.load(Ordering::Relaxed) {
        let mut control = shared.control.lock();
        while !(control.should_ponder
            || control.calculation_requested
            || shared.quit.load(Ordering::Relaxed))
        {
            shared.wakeup.wait(&mut control);
        }

        if shared.quit.load(Ordering::Relaxed)
            || control.calculation_requested
            || !control.should_ponder
        {
            break;
        }

        let snapshot = control.game.clone();
        drop(control);

        let pondered = search.find_best_move(&snapshot.board, MAX_PONDER_DEPTH, &snapshot.repetition);
        if pondered.is_none() {
            // nothing to ponder on; but if a calculation request arrived in
            // the meantime the flag must survive for the committed search
            let mut control = shared.control.lock();
            if !control.calculation_requested {
                control.should_ponder = false;
            }
        }
    }
}

fn run(shared: Arc<Shared>, mut search: ParallelSearch, mut sink: Box<dyn Write + Send>) {
    while !shared.quit.load(Ordering::Relaxed) {
        think(&shared, &mut search);
        if shared.quit.load(Ordering::Relaxed) {
            break;
        }

        let snapshot = {
            let mut control = shared.control.lock();
            control.calculation_requested = false;
            control.game.clone()
        };

        match search.find_best_move(&snapshot.board, snapshot.depth, &snapshot.repetition) {
            Some(best) if !shared.quit.load(Ordering::Relaxed) => {
                emit_move(sink.as_mut(), best);

                // don't wait for the GUI: assume the answer is played and
                // start thinking on the reply right away
                let mut control = shared.control.lock();
                if !control.calculation_requested {
                    control.game.board = control.game.board.make_move_new(best);
                    control.should_ponder = true;
                }
            }
            Some(_) => {} // shutting down, the move is discarded
            None => {
                // the position has no legal moves, or the search was stopped
                shared.control.lock().should_ponder = false;
            }
        }
    }
}

fn emit_move(sink: &mut dyn Write, best: chess::ChessMove) {
    let written = writeln!(sink, "bestmove {}", best).and_then(|_| sink.flush());
    if let Err(error) = written {
        warn!("failed to emit best move: {}", error);
    }
}
