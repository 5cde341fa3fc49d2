// src/uci/mod.rs

use chess::{Board, ChessMove, MoveGen};
use std::io::{self, BufRead};
use std::str::FromStr;
use std::sync::Arc;

use crate::repetition::RepetitionMap;
use crate::search::lazy_smp::ParallelSearch;
use crate::search::thread::{GameState, SearchThread};
use crate::search::tt::TranspositionTable;

const DEFAULT_HASH_MB: usize = 256;

/// Stdin-driven UCI loop. Owns the search thread and the game state the GUI
/// has established so far.
pub struct UciHandler {
    board: Board,
    repetition: RepetitionMap,
    depth: u8,
    threads: usize,
    hash_mb: usize,
    tt: Option<Arc<TranspositionTable>>,
    search: Option<SearchThread>,
}

impl UciHandler {
    pub fn new(depth: u8) -> Self {
        Self {
            board: Board::default(),
            repetition: RepetitionMap::new(),
            depth,
            threads: ParallelSearch::hardware_threads(),
            hash_mb: DEFAULT_HASH_MB,
            tt: None,
            search: None,
        }
    }

    pub fn run(&mut self) {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(cmd) = line else { break };
            let cmd = cmd.trim();
            if cmd.is_empty() {
                continue;
            }
            if !self.handle_command(cmd) {
                break;
            }
        }
    }

    fn handle_command(&mut self, command: &str) -> bool {
        let parts: Vec<&str> = command.split_whitespace().collect();
        match parts.first().copied() {
            Some("uci") => {
                println!("id name Kestrel 0.1");
                println!("id author Kestrel authors");
                println!(
                    "option name Hash type spin default {} min 1 max 65536",
                    DEFAULT_HASH_MB
                );
                println!("option name Threads type spin default {} min 1 max 256", self.threads);
                println!("uciok");
            }
            Some("isready") => {
                println!("readyok");
            }
            Some("ucinewgame") => {
                self.board = Board::default();
                self.repetition.clear();
                if let Some(tt) = &self.tt {
                    tt.clear();
                }
            }
            Some("position") => {
                self.handle_position(&parts[1..]);
            }
            Some("go") => {
                self.handle_go(&parts[1..]);
            }
            Some("stop") => {
                if let Some(search) = &self.search {
                    search.stop();
                }
            }
            Some("setoption") => {
                self.handle_setoption(&parts[1..]);
            }
            Some("quit") => {
                return false;
            }
            _ => {}
        }
        true
    }

    fn handle_setoption(&mut self, parts: &[&str]) {
        let Some(value_at) = parts.iter().position(|&part| part == "value") else {
            return;
        };
        if parts.first() != Some(&"name") || value_at + 1 >= parts.len() {
            return;
        }

        let name = parts[1..value_at].join(" ").to_lowercase();
        let value = parts[value_at + 1..].join(" ");

        // both options only take effect before the search thread exists
        match name.as_str() {
            "hash" => {
                if let Ok(mb) = value.parse::<usize>() {
                    self.hash_mb = mb.max(1);
                }
            }
            "threads" => {
                if let Ok(threads) = value.parse::<usize>() {
                    self.threads = threads.clamp(1, 256);
                }
            }
            _ => {}
        }
    }

    fn handle_position(&mut self, parts: &[&str]) {
        self.repetition.clear();
        let mut i = 0;

        if parts.first() == Some(&"startpos") {
            self.board = Board::default();
            i = 1;
        } else if parts.first() == Some(&"fen") {
            let mut fen_parts = Vec::new();
            i = 1;
            while i < parts.len() && parts[i] != "moves" {
                fen_parts.push(parts[i]);
                i += 1;
            }
            let fen = fen_parts.join(" ");
            match Board::from_str(&fen) {
                Ok(board) => self.board = board,
                Err(_) => return,
            }
        } else {
            return;
        }

        self.repetition.push(&self.board);

        if parts.get(i) == Some(&"moves") {
            for token in &parts[i + 1..] {
                let Some(mv) = parse_uci_move(&self.board, token) else {
                    break;
                };
                self.board = self.board.make_move_new(mv);
                self.repetition.push(&self.board);
            }
        }

        let state = GameState::new(self.board, self.repetition.clone(), self.depth);
        self.search_thread().set_position(state);
    }

    fn handle_go(&mut self, parts: &[&str]) {
        let mut depth = self.depth;
        if parts.first() == Some(&"depth") {
            if let Some(parsed) = parts.get(1).and_then(|value| value.parse().ok()) {
                depth = parsed;
            }
        }
        self.search_thread().go(depth.max(1));
    }

    fn search_thread(&mut self) -> &SearchThread {
        if self.search.is_none() {
            let tt = Arc::new(TranspositionTable::new(self.hash_mb));
            let search = ParallelSearch::new(Arc::clone(&tt), self.threads);
            self.tt = Some(tt);
            self.search = Some(SearchThread::new(search, Box::new(io::stdout())));
        }
        self.search.as_ref().unwrap()
    }
}

/// Parses a move in coordinate notation by matching it against the legal
/// moves of the position.
fn parse_uci_move(board: &Board, token: &str) -> Option<ChessMove> {
    MoveGen::new_legal(board).find(|mv| mv.to_string() == token)
}
