use std::{env, fs, process::ExitCode, sync::Arc, time::Instant};

use ferrule::{
    Code, Frame, FrameExit, Namespace, NoLimitTracker, NoopTracer, Runtime, StderrTracer, StdPrint, VM, VmTracer,
    disassemble,
};

const USAGE: &str = "usage: ferrule <dis|run|trace> <file>";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let (Some(command), Some(file_path)) = (args.get(1), args.get(2)) else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };
    let code = match read_code(file_path) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    match command.as_str() {
        "dis" => {
            print!("{}", disassemble(&code));
            ExitCode::SUCCESS
        }
        "run" => run(code, NoopTracer),
        "trace" => run(code, StderrTracer::new()),
        other => {
            eprintln!("unknown command '{other}'\n{USAGE}");
            ExitCode::FAILURE
        }
    }
}

/// Runs `code` as a module; `tracer` sees every instruction.
fn run(code: Code, tracer: impl VmTracer) -> ExitCode {
    let runtime = Runtime::new();
    let mut tracker = NoLimitTracker;
    let mut print = StdPrint::new();
    let mut frame = Frame::new(Arc::new(code), Namespace::new());
    let mut vm = VM::with_tracer(&runtime, &mut tracker, &mut print, tracer);

    let start = Instant::now();
    let result = vm.execute_frame(&mut frame);
    let elapsed = start.elapsed();
    drop(vm);
    // flush program output before reporting the result
    drop(print);
    match result {
        Ok(FrameExit::Return(value)) => {
            if !value.is_none() {
                println!("{}", value.py_repr(&runtime));
            }
            eprintln!("success after: {elapsed:?}");
            ExitCode::SUCCESS
        }
        Ok(FrameExit::Yield(_)) => {
            eprintln!("error after: {elapsed:?}\nmodule code cannot yield");
            ExitCode::FAILURE
        }
        Err(err) => {
            let exception = err.into_exception(&runtime);
            eprintln!("error after: {elapsed:?}\n{exception}");
            ExitCode::FAILURE
        }
    }
}

fn read_code(file_path: &str) -> Result<Code, String> {
    let bytes = fs::read(file_path).map_err(|err| format!("reading {file_path}: {err}"))?;
    Code::from_bytes(&bytes).map_err(|err| format!("decoding {file_path}: {err}"))
}
