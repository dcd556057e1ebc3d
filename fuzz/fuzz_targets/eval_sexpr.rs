#![no_main]

use libfuzzer_sys::fuzz_target;
use schemelet::{EvalConfig, GlobalStore, evaluator, parser, substitution};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(parsed) = parser::parse(s) {
            // Keep runaway recursion well inside the fuzzer's stack
            let config = EvalConfig { max_depth: 256 };
            let _ = evaluator::eval_with_config(&parsed, &evaluator::create_global_env(), &config);
            let _ = substitution::eval_with_config(&parsed, &mut GlobalStore::new(), &config);
        }
    }
});
