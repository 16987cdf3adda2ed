use stampede::entry;
use stampede::error::AppResult;

fn main() -> AppResult<()> {
    entry::run()
}
