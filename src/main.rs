use woodpecker::error::AppResult;

fn main() -> AppResult<()> {
    woodpecker::entry::run()
}
