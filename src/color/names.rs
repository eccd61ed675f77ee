pub const UNKNOWN_COLOR_NAME: &str = "Unknown";

/// Reference palette for naming samples. Order matters: on equal distance the
/// earlier entry wins.
pub const NAMED_COLORS: [(&str, [i32; 3]); 23] = [
    ("Black", [0, 0, 0]),
    ("White", [255, 255, 255]),
    ("Red", [255, 0, 0]),
    ("Lime", [0, 255, 0]),
    ("Blue", [0, 0, 255]),
    ("Yellow", [255, 255, 0]),
    ("Cyan", [0, 255, 255]),
    ("Magenta", [255, 0, 255]),
    ("Gray", [128, 128, 128]),
    ("Orange", [255, 165, 0]),
    ("Pink", [255, 192, 203]),
    ("SkyBlue", [135, 206, 235]),
    ("Purple", [128, 0, 128]),
    ("Brown", [165, 42, 42]),
    ("Teal", [0, 128, 128]),
    ("Navy", [0, 0, 128]),
    ("Green", [0, 128, 0]),
    ("Olive", [128, 128, 0]),
    ("Maroon", [128, 0, 0]),
    ("Silver", [192, 192, 192]),
    ("Gold", [255, 215, 0]),
    ("Indigo", [75, 0, 130]),
    ("Violet", [238, 130, 238]),
];

/// Name of the palette entry closest to the triple by squared Euclidean
/// distance in RGB space.
pub fn nearest_name(r: i32, g: i32, b: i32) -> &'static str {
    let mut closest = UNKNOWN_COLOR_NAME;
    let mut min_distance = i64::MAX;

    for (name, [cr, cg, cb]) in NAMED_COLORS.iter() {
        let distance = squared(r - cr) + squared(g - cg) + squared(b - cb);
        if distance < min_distance {
            min_distance = distance;
            closest = name;
        }
    }

    closest
}

fn squared(delta: i32) -> i64 {
    let delta = delta as i64;
    delta * delta
}
