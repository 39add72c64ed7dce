//! # REPL
//!
//! A small interactive loop over [`Database`]. Lines starting with `.`
//! are shell commands and run immediately; anything else accumulates
//! until a terminating `;` and is executed as SQL. Errors are printed and
//! the loop continues; `.quit` or Ctrl+D ends the session.

use eyre::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::database::{Database, ExecuteResult, OwnedValue};

const PRIMARY_PROMPT: &str = "rowlite> ";
const CONTINUATION_PROMPT: &str = "    ...> ";

pub struct Repl {
    db: Database,
    editor: DefaultEditor,
    sql_buffer: String,
}

impl Repl {
    pub fn new(db: Database) -> Result<Self> {
        Ok(Self {
            db,
            editor: DefaultEditor::new()?,
            sql_buffer: String::new(),
        })
    }

    pub fn run(&mut self) -> Result<()> {
        println!("rowlite {}", env!("CARGO_PKG_VERSION"));
        println!("Enter \".help\" for usage hints.");

        loop {
            let prompt = if self.sql_buffer.is_empty() {
                PRIMARY_PROMPT
            } else {
                CONTINUATION_PROMPT
            };

            match self.editor.readline(prompt) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(&line);
                    if !self.handle_line(&line) {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    self.sql_buffer.clear();
                }
                Err(ReadlineError::Eof) => break,
                Err(e) => {
                    eprintln!("input error: {}", e);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Returns false when the session should end.
    fn handle_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();

        if self.sql_buffer.is_empty() && trimmed.starts_with('.') {
            return self.dot_command(trimmed);
        }

        if trimmed.is_empty() {
            return true;
        }

        self.sql_buffer.push_str(line);
        self.sql_buffer.push('\n');

        if trimmed.ends_with(';') {
            let sql = std::mem::take(&mut self.sql_buffer);
            match self.db.execute(sql.trim()) {
                Ok(result) => print_result(&result),
                Err(e) => eprintln!("error: {}", e),
            }
        }
        true
    }

    fn dot_command(&mut self, command: &str) -> bool {
        match command {
            ".quit" | ".exit" => false,
            ".help" => {
                println!(".help              show this message");
                println!(".tables            list table names");
                println!(".schema            list table definitions");
                println!(".dbinfo            page size and page count");
                println!(".quit              exit");
                true
            }
            ".tables" => {
                for name in self.table_names() {
                    println!("{}", name);
                }
                true
            }
            ".schema" => {
                for name in self.table_names() {
                    if let Ok(root) = self.db.root_of(&name) {
                        println!("{} (root page {})", name, root);
                    }
                }
                true
            }
            ".dbinfo" => {
                println!("page size:          {}", self.db.page_size());
                println!("database page count: {}", self.db.database_size_in_pages());
                true
            }
            other => {
                eprintln!("unknown command: {}", other);
                true
            }
        }
    }

    fn table_names(&self) -> Vec<String> {
        let mut names = self.db.table_names();
        names.sort();
        names
    }
}

fn print_result(result: &ExecuteResult) {
    match result {
        ExecuteResult::CreateTable { root_page } => {
            println!("ok (root page {})", root_page);
        }
        ExecuteResult::Insert { rows_affected } => {
            println!("ok ({} row inserted)", rows_affected);
        }
        ExecuteResult::Select { rows } => {
            for row in rows {
                let rendered: Vec<String> = row.values().iter().map(render_value).collect();
                println!("{}", rendered.join("|"));
            }
            println!("({} rows)", rows.len());
        }
    }
}

fn render_value(value: &OwnedValue) -> String {
    match value {
        OwnedValue::Null => String::new(),
        OwnedValue::Integer(n) => n.to_string(),
        OwnedValue::Real(x) => x.to_string(),
        OwnedValue::Text(text) => text.clone(),
        OwnedValue::Blob(blob) => format!("<blob {} bytes>", blob.len()),
    }
}
