fn main() -> anyhow::Result<()> {
    scriptmine::run()
}
