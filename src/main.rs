fn main() {
    electrode_sites::cli::run();
}
