fn main() {
    std::process::exit(rtd_probe::runtime::run_from_args());
}
