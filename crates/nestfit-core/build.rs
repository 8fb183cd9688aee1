// build.rs for nestfit-core
//
// The dashboard shows which capabilities the nested_fit executable was built
// with. Packagers export these as environment variables when building the
// wrapper; unset flags fall back to a plain release build.

const FLAGS: [(&str, &str, &str); 5] = [
    ("NESTFIT_OPENMP", "NF_FEATURE_OPENMP", "OFF"),
    ("NESTFIT_OPENMPI", "NF_FEATURE_OPENMPI", "OFF"),
    ("NESTFIT_LTRACE", "NF_FEATURE_LTRACE", "OFF"),
    ("NESTFIT_BUILDTYPE", "NF_FEATURE_BUILDTYPE", "Release"),
    ("NESTFIT_PPROF", "NF_FEATURE_PPROF", "OFF"),
];

fn main() {
    for (input, output, default) in FLAGS {
        let value = std::env::var(input).unwrap_or_else(|_| default.to_string());
        println!("cargo:rustc-env={output}={value}");
        println!("cargo:rerun-if-env-changed={input}");
    }
}
