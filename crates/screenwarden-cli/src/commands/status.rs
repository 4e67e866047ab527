use super::{print_json, CmdResult, Session};

pub fn run() -> CmdResult {
    let session = Session::open()?;
    let snapshot = session.engine.snapshot()?;
    print_json(&snapshot)
}
