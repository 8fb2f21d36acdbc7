// Benchmark for line framing and reply classification
// Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use stepper_link::protocol::{classify, parse_command, LineFramer, Utf8Decoder};

fn status_stream() -> Vec<u8> {
    let mut stream = String::new();
    for i in 0..10_000 {
        stream.push_str(&format!(
            "{{\"motor\":\"Motor{}\",\"position\":{},\"revolutions\":0.5,\"status\":\"MOVING\",\"code\":203}}\r\n",
            i % 3 + 1,
            i
        ));
    }
    stream.into_bytes()
}

fn bench_framing(c: &mut Criterion) {
    let stream = status_stream();
    c.bench_function("frame 10k status lines in 64 byte chunks", |b| {
        b.iter(|| {
            let mut decoder = Utf8Decoder::new();
            let mut framer = LineFramer::new();
            let mut count = 0;
            for chunk in stream.chunks(64) {
                count += framer.feed(&decoder.decode(chunk)).len();
            }
            assert_eq!(count, 10_000);
        });
    });
}

fn bench_classify(c: &mut Criterion) {
    let lines = [
        r#"{"motor":"Motor1","position":120,"status":"IDLE","code":201}"#,
        r#"{"motors":[{"motorName":"Motor1","position":1},{"motorName":"Motor2","position":2},{"motorName":"Motor3","position":3}],"code":210}"#,
        r#"{"type":"AUX","message":"{\"type\":\"SUCCESS\",\"code\":200}","code":301}"#,
        "=== Triple Motor Controller ===",
    ];
    c.bench_function("classify mixed replies", |b| {
        b.iter(|| {
            let parsed = lines.iter().filter(|line| classify(line).is_ok()).count();
            assert_eq!(parsed, 3);
        });
    });
}

fn bench_parse_command(c: &mut Criterion) {
    let commands = ["1:500", "2:-120.5", "100,200,300", "s", "x2.5", "mopen"];
    c.bench_function("parse host commands", |b| {
        b.iter(|| {
            for text in &commands {
                assert!(parse_command(text, 3).is_ok());
            }
        });
    });
}

criterion_group!(benches, bench_framing, bench_classify, bench_parse_command);
criterion_main!(benches);
