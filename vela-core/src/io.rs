//! Where `print` statements go. Keeping this behind a trait (rather than
//! a bare `println!`) is what lets tests capture output instead of
//! racing stdout.

/// A destination for `print` output. One line per call, no trailing
/// newline handling required of the caller.
pub trait PrintSink {
    fn print_line(&mut self, line: &str);
}

pub struct StdoutSink;

impl PrintSink for StdoutSink {
    fn print_line(&mut self, line: &str) {
        println!("{line}");
    }
}

use std::cell::RefCell;
use std::rc::Rc;

/// Captures output in memory; used by tests and embedders that want the
/// program's output as data rather than a side effect. Cloning the
/// handle before handing the sink to an `Interpreter` lets the caller
/// read `lines` back out after the run.
#[derive(Clone, Default)]
pub struct CollectSink {
    lines: Rc<RefCell<Vec<String>>>,
}

impl CollectSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }
}

impl PrintSink for CollectSink {
    fn print_line(&mut self, line: &str) {
        self.lines.borrow_mut().push(line.to_string());
    }
}
