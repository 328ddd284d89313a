//! Generate control frame test vectors for browser client interop testing.
//!
//! Run with: cargo run --package protocol --example test_vectors

use protocol::{classify, ControlCommand, Frame, InboundAction, TerminalSize};

fn main() {
    let vectors = [
        ("resize_80x24", ControlCommand::Resize(TerminalSize::new(80, 24)).to_json()),
        ("resize_200x60", ControlCommand::Resize(TerminalSize::new(200, 60)).to_json()),
        ("resize_zero_cols", r#"{"type":"resize","cols":0,"rows":24}"#.to_string()),
        ("unknown_type", r#"{"type":"paste","data":"ls"}"#.to_string()),
        ("plain_text", "echo hello".to_string()),
    ];

    for (name, text) in vectors {
        print_test_vector(name, &text);
    }
}

fn print_test_vector(name: &str, text: &str) {
    let verdict = match classify(Frame::text(text)) {
        InboundAction::Resize(size) => format!("resize {}x{}", size.cols, size.rows),
        InboundAction::Input(_) => "input".to_string(),
        InboundAction::Close => "close".to_string(),
        InboundAction::Ignore => "ignore".to_string(),
    };
    println!("// {}", name);
    println!("{{ text: {:?}, expect: {:?} }},", text, verdict);
    println!();
}
