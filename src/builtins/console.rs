// Console built-in
// Provides: print

use crate::vm::value::Value;
use std::io::Write;

pub fn print(args: &[Value], _state: &mut Value) -> Result<Value, String> {
    let mut output = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            output.push(' ');
        }
        output.push_str(&arg.to_string());
    }

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", output).map_err(|e| e.to_string())?;
    stdout.flush().ok();

    Ok(Value::Nothing)
}
