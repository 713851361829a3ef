use voice_session::utils;

fn main() {
    match utils::device::get_available_inputs() {
        Ok(inputs) => println!("Available inputs:\n{}", inputs),
        Err(e) => eprintln!("Failed to list inputs: {:#}", e),
    }

    match utils::device::get_available_outputs() {
        Ok(outputs) => println!("Available outputs:\n{}", outputs),
        Err(e) => eprintln!("Failed to list outputs: {:#}", e),
    }
}
