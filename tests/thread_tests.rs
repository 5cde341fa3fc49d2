use chess::Board;
use kestrel_engine::repetition::RepetitionMap;
use kestrel_engine::search::lazy_smp::ParallelSearch;
use kestrel_engine::search::thread::{GameState, SearchThread};
use kestrel_engine::search::tt::TranspositionTable;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Captures everything the engine emits so tests can assert on it.
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedSink {
    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn wait_for_lines(&self, count: usize, timeout: Duration) -> Vec<String> {
        let deadline = Instant::now() + timeout;
        loop {
            let lines = self.lines();
            if lines.len() >= count || Instant::now() >= deadline {
                return lines;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

fn spawn_engine(threads: usize) -> (SearchThread, SharedSink) {
    let tt = Arc::new(TranspositionTable::new(8));
    let search = ParallelSearch::new(tt, threads);
    let sink = SharedSink::default();
    let thread = SearchThread::new(search, Box::new(sink.clone()));
    (thread, sink)
}

fn best_move_of(line: &str) -> &str {
    line.strip_prefix("bestmove ").expect("a bestmove line")
}

fn startpos_state(depth: u8) -> GameState {
    let board = Board::default();
    let mut repetition = RepetitionMap::new();
    repetition.push(&board);
    GameState::new(board, repetition, depth)
}

#[test]
fn go_emits_exactly_one_best_move() {
    let (engine, sink) = spawn_engine(2);

    engine.set_position(startpos_state(3));
    std::thread::sleep(Duration::from_millis(50)); // let the ponder spin up
    engine.go(3);

    let lines = sink.wait_for_lines(1, Duration::from_secs(10));
    assert_eq!(lines.len(), 1);
    let mv = best_move_of(&lines[0]);
    assert!(util::parse_move(&Board::default(), mv).is_some());

    // the engine ponders afterwards but must not emit again
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(sink.lines().len(), 1);
}

#[test]
fn ponder_then_compute_answers_without_a_new_position() {
    let (engine, sink) = spawn_engine(2);

    engine.set_position(startpos_state(4));
    std::thread::sleep(Duration::from_millis(50));
    engine.go(4);
    let lines = sink.wait_for_lines(1, Duration::from_secs(10));
    assert_eq!(lines.len(), 1);

    let board = Board::default();
    let first = util::parse_move(&board, best_move_of(&lines[0]))
        .expect("first answer is legal from the start position");
    let advanced = board.make_move_new(first);

    // no new position command: the engine advanced its own state and is
    // pondering; a bare go must still produce an answer
    std::thread::sleep(Duration::from_millis(50));
    engine.go(4);
    let lines = sink.wait_for_lines(2, Duration::from_secs(10));
    assert_eq!(lines.len(), 2);

    let second = util::parse_move(&advanced, best_move_of(&lines[1]));
    assert!(second.is_some(), "second answer must be legal after {first}");
}

#[test]
fn stop_quenches_a_deep_calculation() {
    let (engine, sink) = spawn_engine(2);

    engine.set_position(startpos_state(3));
    std::thread::sleep(Duration::from_millis(50));
    engine.go(30);

    // give the dispatch a moment, then keep pressing stop so the request
    // cannot be lost to the dispatch's own flag reset
    std::thread::sleep(Duration::from_millis(100));
    let deadline = Instant::now() + Duration::from_secs(1);
    while Instant::now() < deadline {
        engine.stop();
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(sink.lines().len(), 0, "a cancelled go must not emit");

    // the thread is idle, not dead: a shallow go still answers
    engine.go(2);
    let lines = sink.wait_for_lines(1, Duration::from_secs(10));
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("bestmove "));
}

#[test]
fn pondering_alone_emits_nothing() {
    let (engine, sink) = spawn_engine(2);

    engine.set_position(startpos_state(3));
    std::thread::sleep(Duration::from_millis(150));
    assert!(sink.lines().is_empty());
    drop(engine);
}

#[test]
fn shutdown_interrupts_a_running_ponder() {
    let (engine, _sink) = spawn_engine(2);

    engine.set_position(startpos_state(3));
    std::thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    drop(engine);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn terminal_position_clears_the_ponder_flag() {
    let (engine, sink) = spawn_engine(2);

    // stalemate: pondering finds no move and the thread settles down
    let board = Board::from_str("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
    engine.set_position(GameState::new(board, RepetitionMap::new(), 3));

    std::thread::sleep(Duration::from_millis(150));
    assert!(sink.lines().is_empty());
}

/// Tiny shared helper: resolve coordinate notation against a position.
mod util {
    use chess::{Board, ChessMove, MoveGen};

    pub fn parse_move(board: &Board, token: &str) -> Option<ChessMove> {
        MoveGen::new_legal(board).find(|mv| mv.to_string() == token)
    }
}
