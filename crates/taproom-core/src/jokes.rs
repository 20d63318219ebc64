//! Kneipen jokes and toasts, grouped by party level.

use rand::seq::IndexedRandom;
use taproom_voice::MAX_LEVEL;

const FALLBACK: &str = "Prost!";

const LEVEL_0: &[&str] = &[
    "Hier ist es so ruhig… selbst mein Bier schläft schon.",
    "Ist das hier ne Party oder ein Wartezimmer?",
    "So still hier… ich hör die Hefe arbeiten.",
    "Hallo? Ist da jemand? Oder red ich mit den Bierdeckeln?",
    "In diesem Tempo wird mein Bier schneller warm als die Stimmung.",
    "Letzte Kneipe war lauter. Und die war geschlossen.",
    "Ich hab schon lautere Bibliotheken erlebt.",
    "Wenn's noch stiller wird, hör ich das Licht flackern.",
];

const LEVEL_1: &[&str] = &[
    "Der Barkeeper arbeitet heute ehrenamtlich… er bekommt nur Trinkgeld.",
    "Was ist der Unterschied zwischen Bier und Wasser? Bier macht lustig, Wasser macht sauber. Beides braucht hier keiner.",
    "Ein Bier bestellt man nicht. Man rettet es aus der Flasche.",
    "Prost! Auf die, die nicht hier sind – die verpassen was!",
    "Mein Arzt sagt, ich soll aufhören zu trinken. Ich hab den Arzt gewechselt.",
    "Bier ist der Beweis, dass Gott uns liebt und will, dass wir glücklich sind.",
    "Ein Tag ohne Bier ist wie… keine Ahnung, hab ich noch nie probiert.",
    "Alkohol löst keine Probleme. Aber Wasser auch nicht.",
    "Bier vor vier – da bin ich mir sicher.",
    "Ich trinke nur an Tagen die mit G enden. Und mittwochs.",
];

const LEVEL_2: &[&str] = &[
    "Wenn du dein Bier suchst: es steht direkt vor deiner Zukunft.",
    "Ab jetzt zählt jedes Bier doppelt. Also trinkt langsamer! Oder schneller. Mir egal.",
    "Mein Bier sagt mir, ich bin toll. Mein Bier lügt nie.",
    "Warum gehen Witze immer in die Bar? Weil dort alle lachen.",
    "Wer sein Bier nicht liebt, ist selber schuld.",
    "Jetzt wird's gemütlich! Also… für die Bierdeckel.",
    "Alkohol ist keine Lösung. Chemisch gesehen schon.",
    "Ich bin nicht betrunken. Ich bin emotional flexibel.",
    "Der beste Moment einer Party? Der nächste Schluck.",
    "Lieber arm dran als Arm ab. Prost!",
];

const LEVEL_3: &[&str] = &[
    "Ab diesem Pegel werden Entscheidungen getroffen, die morgen jemand anders erklären muss.",
    "Morgen ist auch noch ein Tag – zum Bereuen!",
    "Die beste Entscheidung triffst du nach dem fünften Bier. Hat mir mein sechstes Bier gesagt.",
    "Wir sind an dem Punkt, wo alle Ideen gleichzeitig genial und furchtbar sind.",
    "Wer nüchtern fährt, fährt am besten. Wer betrunken fährt, fährt am kürzesten.",
    "In dieser Runde wird nicht mehr diskutiert. Nur noch bestellt!",
    "Das hier ist kein Kontrollverlust. Das ist kontrollierte Hingabe.",
    "Ab jetzt übernimmt das Bier die Planung!",
    "Ihr seid alle eingeladen zu meiner Entschuldigungs-Party morgen früh.",
    "Drei Bier sind auch ein Schnitzel!",
];

const LEVEL_4: &[&str] = &[
    "Die Musik ist nicht zu laut… ihr seid zu nüchtern.",
    "Jetzt noch was Schlaues sagen? Unmöglich. Aber Lustiges geht immer!",
    "Wenn dich jemand fragt was du heute gemacht hast, sag einfach: Erinnerungen gelöscht.",
    "Ich merk schon, heute wird eine Geschichte für die Enkel. Oder das Gericht.",
    "Ab jetzt gilt: Was in der Kneipe passiert, bleibt in der Kneipe.",
    "Wir sind auf dem Level wo Fremde zu besten Freunden werden!",
    "Dein Kater morgen ist nur die Erinnerung an den geilsten Abend deines Lebens.",
    "Tanzen ist wie Laufen, nur sinnvoller!",
    "Ab jetzt wird jede SMS ein Abenteuer.",
    "Wer jetzt noch Wasser bestellt, wird rausgeworfen!",
];

const LEVEL_5: &[&str] = &[
    "Wenn du jetzt noch gerade läufst, bist du nur auf dem Weg zur nächsten Runde.",
    "Party-Level Maximum! Ab hier geht's nur noch bergab – und das ist gut so!",
    "Mein Bierdeckel ist nasser als dein letzter Witz. Aber das hier ist Chaos auf Meisterebene!",
    "Wir haben offiziell den Punkt überschritten, ab dem Google Maps nicht mehr hilft.",
    "Taxi? Wohin? Ich weiß ja nicht mal mehr wo ich bin!",
    "Morgen gibt's nur noch Fragen und keine Antworten.",
    "Das ist nicht mehr feiern. Das ist Leistungssport!",
    "Wer noch stehen kann: Respekt. Wer nicht: noch mehr Respekt!",
    "Ab hier schreiben wir Geschichte. Oder zumindest den Polizeibericht.",
    "Die letzte Runde? Die war vor fünf Runden!",
];

const TOASTS: &[&str] = &[
    "Prost! Auf die Leber – und ihren unermüdlichen Einsatz!",
    "Ex oder Anex!",
    "Auf uns! Die Schönsten hier drin!",
    "Hoch die Tassen – runter damit!",
    "Prost! Möge dein Glas nie leer sein!",
    "Ein Hoch auf alle die noch stehen!",
    "Auf die Freundschaft! Solange wir uns noch erkennen!",
    "Bier her, Bier her, oder ich fall um!",
];

const TABLES: [&[&str]; MAX_LEVEL as usize + 1] = [LEVEL_0, LEVEL_1, LEVEL_2, LEVEL_3, LEVEL_4, LEVEL_5];

/// Random pick from a phrase table, `"Prost!"` when the table is empty.
pub fn pick<'a>(table: &[&'a str]) -> &'a str {
    table.choose(&mut rand::rng()).copied().unwrap_or(FALLBACK)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JokeBook;

impl JokeBook {
    pub fn new() -> Self {
        Self
    }

    /// The jokes told at `level`. Levels above the maximum use the top table.
    pub fn table(&self, level: u8) -> &'static [&'static str] {
        TABLES[usize::from(level.min(MAX_LEVEL))]
    }

    pub fn joke(&self, level: u8) -> String {
        pick(self.table(level)).to_string()
    }

    pub fn toast(&self) -> String {
        pick(TOASTS).to_string()
    }

    /// Any joke from any level.
    pub fn random_joke(&self) -> String {
        let all: Vec<&str> = TABLES.iter().flat_map(|t| t.iter().copied()).collect();
        pick(&all).to_string()
    }

    pub fn toasts(&self) -> &'static [&'static str] {
        TOASTS
    }
}
