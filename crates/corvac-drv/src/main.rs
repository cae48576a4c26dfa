use corvac_drv::{execute, Config};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match Config::from_args(&args).and_then(|config| execute(&config)) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}
