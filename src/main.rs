fn main() {
    book_lens_lib::init_logging();
    if let Err(e) = book_lens_lib::run() {
        eprintln!("エラー: {:#}", e);
        std::process::exit(1);
    }
}
