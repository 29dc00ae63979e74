fn main() {
    // ESP-IDF link environment is only needed for device builds; host builds
    // (tests, fuzzing) compile without the toolchain.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
