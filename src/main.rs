#![allow(missing_docs)]

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bizscout_lib::run(std::env::args().skip(1).collect()).await
}
