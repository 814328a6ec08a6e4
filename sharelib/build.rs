fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    // Generated here rather than with a const item so the table is cached between compilations
    let out_dir = std::env::var_os("OUT_DIR").expect("cargo always sets OUT_DIR for build scripts");
    let path = std::path::Path::new(&out_dir).join("hex.rs");
    let table = format!("{:?}", generate_digit_table());
    std::fs::write(
        &path,
        format!("pub const INVALID_DIGIT: u8 = {INVALID_DIGIT};\npub const HEX_DIGITS: [u8; u8::MAX as usize + 1] = {table};\n"),
    )
    .expect("couldn't write the hex digit table");
}

const INVALID_DIGIT: u8 = 0xFF;

/// Maps every byte to its hexadecimal value, or INVALID_DIGIT when it isn't a hex character
const fn generate_digit_table() -> [u8; u8::MAX as usize + 1] {
    let mut output = [INVALID_DIGIT; u8::MAX as usize + 1];
    let mut input: usize = 0;
    while input <= u8::MAX as usize {
        let byte = input as u8;
        output[input] = match byte {
            b'0'..=b'9' => byte - b'0',
            b'A'..=b'F' => byte - b'A' + 10,
            b'a'..=b'f' => byte - b'a' + 10,
            _ => INVALID_DIGIT,
        };
        input += 1;
    }
    output
}
