use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use flowexpr_lexer::Lexer;

fn bench_lexer(c: &mut Criterion) {
    let policy = "ip4 && tcp.dst == {80, 443, 8080} && ip4.src == 10.0.0.0/8 \
                  && eth.src == 00:01:02:03:04:05 && inport == \"lport-17\"";

    c.bench_function("lex_policy_expression", |b| {
        b.iter(|| {
            let count = Lexer::new(black_box(policy)).count();
            black_box(count)
        });
    });

    let addresses = "fe80::1 ::1 10.0.0.0/8 192.168.0.0/255.255.0.0 0xfff0/0xfff0";
    c.bench_function("lex_address_literals", |b| {
        b.iter(|| {
            let count = Lexer::new(black_box(addresses)).count();
            black_box(count)
        });
    });
}

criterion_group!(benches, bench_lexer);
criterion_main!(benches);
