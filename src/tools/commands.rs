//! MI command strings for the debugger actions the tools expose
//!
//! Builders return commands without the leading `-`; the session adds the
//! token and dash when writing.

use crate::mi::value::escape;

/// Quote an argument as an MI c-string
pub fn quote(arg: &str) -> String {
    format!("\"{}\"", escape(arg))
}

/// Run a CLI command through the console interpreter
pub fn console(command: &str) -> String {
    format!("interpreter-exec console {}", quote(command))
}

pub fn file_exec_and_symbols(program: &str) -> String {
    format!("file-exec-and-symbols {}", quote(program))
}

pub fn exec_arguments(args: &[String]) -> String {
    let mut command = String::from("exec-arguments");
    for arg in args {
        command.push(' ');
        command.push_str(&quote(arg));
    }
    command
}

pub fn target_attach(pid: u32) -> String {
    format!("target-attach {}", pid)
}

pub fn core_file(path: &str) -> String {
    console(&format!("target core {}", quote(path)))
}

pub fn break_insert(location: &str, condition: Option<&str>) -> String {
    match condition {
        Some(condition) => format!("break-insert -c {} {}", quote(condition), location),
        None => format!("break-insert {}", location),
    }
}

/// Commands that resume or interrupt the inferior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecAction {
    Run,
    Continue,
    Step { instruction: bool },
    Next { instruction: bool },
    Finish,
    Interrupt,
}

impl ExecAction {
    pub fn command(self) -> &'static str {
        match self {
            ExecAction::Run => "exec-run",
            ExecAction::Continue => "exec-continue",
            ExecAction::Step { instruction: false } => "exec-step",
            ExecAction::Step { instruction: true } => "exec-step-instruction",
            ExecAction::Next { instruction: false } => "exec-next",
            ExecAction::Next { instruction: true } => "exec-next-instruction",
            ExecAction::Finish => "exec-finish",
            ExecAction::Interrupt => "exec-interrupt",
        }
    }
}

/// Innermost `limit` frames; `None` lists the whole stack
pub fn stack_list_frames(limit: Option<u32>) -> String {
    match limit {
        Some(0) | None => "stack-list-frames".to_string(),
        Some(n) => format!("stack-list-frames 0 {}", n - 1),
    }
}

pub fn stack_list_variables() -> String {
    "stack-list-variables --all-values".to_string()
}

pub fn evaluate(expression: &str) -> String {
    format!("data-evaluate-expression {}", quote(expression))
}

/// CLI `x/{count}{format} expr`
pub fn examine(expression: &str, format: &str, count: u32) -> String {
    console(&format!("x/{}{} {}", count, format, expression))
}

pub fn register_names() -> String {
    "data-list-register-names".to_string()
}

pub fn register_values(registers: &[u32]) -> String {
    let mut command = String::from("data-list-register-values x");
    for register in registers {
        command.push_str(&format!(" {}", register));
    }
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_quotes_and_escapes() {
        assert_eq!(console("info frame"), r#"interpreter-exec console "info frame""#);
        assert_eq!(
            console(r#"print "hi\n""#),
            r#"interpreter-exec console "print \"hi\\n\"""#
        );
    }

    #[test]
    fn test_program_commands() {
        assert_eq!(file_exec_and_symbols("/tmp/my prog"), r#"file-exec-and-symbols "/tmp/my prog""#);
        assert_eq!(
            exec_arguments(&["--count".to_string(), "two words".to_string()]),
            r#"exec-arguments "--count" "two words""#
        );
        assert_eq!(exec_arguments(&[]), "exec-arguments");
        assert_eq!(target_attach(4242), "target-attach 4242");
        assert_eq!(
            core_file("core.123"),
            r#"interpreter-exec console "target core \"core.123\"""#
        );
        assert_eq!(
            core_file("/tmp/crash dumps/core.7"),
            r#"interpreter-exec console "target core \"/tmp/crash dumps/core.7\"""#
        );
    }

    #[test]
    fn test_break_insert() {
        assert_eq!(break_insert("main", None), "break-insert main");
        assert_eq!(
            break_insert("loop.c:12", Some("i == 5")),
            r#"break-insert -c "i == 5" loop.c:12"#
        );
    }

    #[test]
    fn test_exec_actions() {
        assert_eq!(ExecAction::Run.command(), "exec-run");
        assert_eq!(ExecAction::Step { instruction: true }.command(), "exec-step-instruction");
        assert_eq!(ExecAction::Next { instruction: false }.command(), "exec-next");
        assert_eq!(ExecAction::Interrupt.command(), "exec-interrupt");
    }

    #[test]
    fn test_inspection_commands() {
        assert_eq!(stack_list_frames(None), "stack-list-frames");
        assert_eq!(stack_list_frames(Some(10)), "stack-list-frames 0 9");
        assert_eq!(stack_list_variables(), "stack-list-variables --all-values");
        assert_eq!(evaluate("arr[1] + 2"), r#"data-evaluate-expression "arr[1] + 2""#);
        assert_eq!(examine("&i", "x", 4), r#"interpreter-exec console "x/4x &i""#);
        assert_eq!(register_values(&[]), "data-list-register-values x");
        assert_eq!(register_values(&[0, 7]), "data-list-register-values x 0 7");
    }
}
