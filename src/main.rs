use std::process::ExitCode;

fn main() -> ExitCode {
    ecs_log_shipper::app::main()
}
