//! VM benchmark binary.
//!
//! Measures decode and execution time for representative stack programs.
//! Run with: `cargo run --release --bin bench`

use std::sync::Arc;
use std::time::{Duration, Instant};

use stackvm::utils::log::{self, Level};
use stackvm::virtual_machine::isa::OpcodeTable;
use stackvm::virtual_machine::program::{Program, decode};
use stackvm::virtual_machine::vm::VM;

// ---------------------------------------------------------------------------
// Benchmark harness
// ---------------------------------------------------------------------------

struct BenchResult {
    name: &'static str,
    iterations: u64,
    total: Duration,
    /// Opcodes executed (or decoded) per iteration.
    ops: u64,
}

impl BenchResult {
    fn avg(&self) -> Duration {
        self.total / self.iterations as u32
    }

    fn print(&self) {
        let ns_per_iter = self.avg().as_nanos();
        let ns_per_op = if self.ops > 0 {
            format!("{:>8.1}", ns_per_iter as f64 / self.ops as f64)
        } else {
            "       -".to_string()
        };
        println!(
            "  {:<30} {:>7} iters {:>10.3} us/iter {:>10} ops  {} ns/op",
            self.name,
            self.iterations,
            ns_per_iter as f64 / 1000.0,
            self.ops,
            ns_per_op,
        );
    }
}

/// Runs `f` for at least `min_duration`, returning aggregated results.
fn bench<F>(name: &'static str, min_duration: Duration, mut f: F) -> BenchResult
where
    F: FnMut() -> u64,
{
    // Warmup
    for _ in 0..5 {
        f();
    }

    let mut iterations = 0u64;
    let mut ops = 0u64;
    let start = Instant::now();
    while start.elapsed() < min_duration {
        ops = f();
        iterations += 1;
    }

    BenchResult {
        name,
        iterations,
        total: start.elapsed(),
        ops,
    }
}

/// Runs a fresh VM over `program` and returns the number of steps taken.
fn execute(program: &Arc<Program>) -> u64 {
    let mut vm = VM::new(Arc::clone(program));
    vm.run().expect("run failed");
    vm.steps()
}

/// Decodes `bytes` and returns the number of opcodes.
fn decode_count(bytes: &[u8], table: &OpcodeTable) -> u64 {
    let program = decode(bytes, table).expect("decode failed");
    program.len() as u64
}

// ---------------------------------------------------------------------------
// Benchmark programs
// ---------------------------------------------------------------------------

/// Wraps `body` in a loop that runs it `iterations` times.
///
/// ```text
/// 0: PUSH3 iterations
/// 4: JUMPDEST
///    <body>               ; must leave the stack as it found it
///    PUSH1 1, SWAP1, SUB  ; counter - 1
///    DUP1, PUSH1 4, JUMPI
///    POP
/// ```
fn counted_loop(iterations: u32, body: &[u8]) -> Vec<u8> {
    let mut code = vec![0x62];
    code.extend_from_slice(&iterations.to_be_bytes()[1..]);
    code.push(0x5b);
    code.extend_from_slice(body);
    code.extend_from_slice(&[0x60, 0x01, 0x90, 0x03, 0x80, 0x60, 0x04, 0x57, 0x50]);
    code
}

const ARITHMETIC_MIX: &[u8] = &[
    0x60, 0x07, // PUSH1 7
    0x60, 0x03, // PUSH1 3
    0x02, // MUL
    0x60, 0x05, // PUSH1 5
    0x01, // ADD
    0x60, 0x02, // PUSH1 2
    0x90, // SWAP1
    0x04, // DIV
    0x60, 0x04, // PUSH1 4
    0x90, // SWAP1
    0x06, // MOD
    0x60, 0x01, // PUSH1 1
    0x1b, // SHL
    0x50, // POP
];

const BRANCH_HEAVY: &[u8] = &[
    0x80, // DUP1
    0x60, 0x01, // PUSH1 1
    0x16, // AND
    0x15, // ISZERO
    0x60, 0x10, // PUSH1 16
    0x57, // JUMPI (even counters skip the next push/pop)
    0x60, 0xff, // PUSH1 0xff
    0x50, // POP
    0x5b, // JUMPDEST
];

const MEMORY: &[u8] = &[
    0x80, // DUP1
    0x80, // DUP1
    0x52, // MSTORE [counter] = counter
    0x80, // DUP1
    0x51, // MLOAD
    0x50, // POP
];

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    log::set_level(Level::Warn);
    log::init_from_env();

    let min = Duration::from_secs(2);
    let table = OpcodeTable::standard();

    println!("VM Benchmarks (each runs for >= 2s)\n");
    println!(
        "  {:<30} {:>7}       {:>14} {:>10}  {:>10}",
        "benchmark", "iters", "avg time", "ops/run", "ns/op"
    );
    println!("  {}", "-".repeat(82));

    let load = |code: &[u8]| Arc::new(decode(code, &table).expect("decode failed"));

    let cases: [(&'static str, u32, &[u8]); 4] = [
        ("tight_loop(100K)", 100_000, &[]),
        ("arithmetic_mix(10K)", 10_000, ARITHMETIC_MIX),
        ("branch_heavy(50K)", 50_000, BRANCH_HEAVY),
        ("mem_load_store(5K)", 5_000, MEMORY),
    ];
    for (name, iterations, body) in cases {
        // Decoding is excluded from the execution benchmarks.
        let program = load(&counted_loop(iterations, body));
        bench(name, min, || execute(&program)).print();
    }

    // Decoding a long straight-line program.
    let straight_line: Vec<u8> = ARITHMETIC_MIX.repeat(2_000);
    let decoded = bench("decode(40KB)", min, || decode_count(&straight_line, &table));
    decoded.print();

    println!();
}
