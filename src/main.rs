fn main() -> anyhow::Result<()> {
    remote_index_cache::run()
}
