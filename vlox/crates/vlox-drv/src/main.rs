fn main() {
    std::process::exit(vlox_drv::main());
}
