// SPDX-License-Identifier: MIT

//! A stand-in child process for `tests/specs.rs`: speaks the same
//! newline-delimited JSON protocol a real agent child would (spec.md §4.B),
//! without calling out to any model. Emits `system-init` on startup, then
//! for every line it reads from stdin replies with one canned text turn
//! (the literal S1 scenario payload from spec.md §8) and goes back to
//! waiting for the next prompt.

use std::io::{self, BufRead, Write};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let resume_id = args
        .iter()
        .position(|a| a == "--resume")
        .and_then(|i| args.get(i + 1))
        .cloned();
    let session_id = resume_id.unwrap_or_else(|| format!("fx-{}", std::process::id()));

    let stdout = io::stdout();
    let mut out = stdout.lock();
    emit(
        &mut out,
        &format!(
            r#"{{"type":"system","subtype":"init","model":"fixture-model","session_id":"{session_id}","cwd":"/fixture"}}"#
        ),
    );

    let stdin = io::stdin();
    let mut turn = 0u32;
    for line in stdin.lock().lines() {
        if line.is_err() {
            break;
        }
        turn += 1;
        let id = format!("m-{turn}");

        emit(
            &mut out,
            r#"{"type":"stream_event","event":{"type":"message_start","message":{}}}"#,
        );
        emit(
            &mut out,
            r#"{"type":"stream_event","event":{"type":"content_block_start","index":0,"content_block":{"type":"text"}}}"#,
        );
        emit(
            &mut out,
            r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello "}}}"#,
        );
        emit(
            &mut out,
            r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"world"}}}"#,
        );
        emit(
            &mut out,
            r#"{"type":"stream_event","event":{"type":"content_block_stop","index":0}}"#,
        );
        emit(
            &mut out,
            &format!(
                r#"{{"type":"assistant","message":{{"id":"{id}","content":[{{"type":"text","text":"Hello world"}}],"usage":{{"input_tokens":100,"output_tokens":2}}}}}}"#
            ),
        );
        emit(
            &mut out,
            r#"{"type":"result","subtype":"success","modelUsage":{"fixture-model":{"contextWindow":200000}}}"#,
        );
    }
}

fn emit(out: &mut impl Write, line: &str) {
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
}
