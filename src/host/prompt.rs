// Interactive entry of controller parameters

use std::io::{self, BufRead, ErrorKind, Write};

use crate::messages::ConfigMessage;

fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<String> {
    write!(output, "{}", question)?;
    output.flush()?;

    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        return Err(io::Error::new(
            ErrorKind::UnexpectedEof,
            "input closed before parameters were entered",
        ));
    }
    Ok(answer)
}

/// Ask for a gain and a setpoint until both parse
pub fn prompt_config<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    controller: usize,
) -> io::Result<ConfigMessage> {
    loop {
        let answer = ask(input, output, &format!("Enter a gain for controller {}: ", controller))?;
        let Ok(gain) = ConfigMessage::parse_gain(&answer) else {
            writeln!(output, "Please enter a valid input")?;
            continue;
        };

        let answer = ask(
            input,
            output,
            &format!("Enter a setpoint for controller {}: ", controller),
        )?;
        let Ok(setpoint) = ConfigMessage::parse_setpoint(&answer) else {
            writeln!(output, "Please enter a valid input")?;
            continue;
        };

        return Ok(ConfigMessage { gain, setpoint });
    }
}
