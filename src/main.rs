fn main() {
    pawtrail_lib::run()
}
