use std::collections::HashSet;
use std::sync::LazyLock;

const WORDS: &str = "
a i an as at be by do go he if in is it me my no of oh on or ox so to up us we ye
all and any are ask bad big box boy but can cat cry cut day did die dog dry due ear eat
end eye far few fit fly for fun get god got gun had has hat her him his hit hot how
ill its key kid lay let lie low man map may men met mix new nor not now odd off oil
old one our out own pay put ran raw red rid row run sat saw say sea see set she shy
sit six sky son sun tax ten the tie tin too top toy try two use van via war was way
web who why win yes yet you
ad ah am aw ax eh ha hi ma ow pa pi uh um
ace act add ado aft age ago aid ail aim air ale amp ant ape apt arc ark arm art ash
ate awe awl axe aye bag ban bar bat bay bed bee beg bet bib bid bin bit boa bog boo
bow bud bug bun bus buy bye cab cad cam cap car cob cod cog con coo cop cot cow coy
cub cud cue cup cur dab dad dam den dew dig dim din dip doe don dot dub dug dun duo
dye ebb eel egg ego elf elk elm era err eve ewe fad fan fat fed fee fen fib fig fin
fir fix flu foe fog fop fox fry fur gab gag gal gap gas gel gem gin gnu gum gut guy
hag ham hay hem hen hew hex hid hip hob hod hoe hog hop hub hue hug hum hut ice icy
imp ink inn ion ire irk ivy jab jam jar jaw jay jet jig job jog jot joy jug jut keg
kin kit lab lad lag lap law lax led leg lid lip lit lob log lot lug mad mat maw mew
mid mob mod mom mop mow mud mug mum nab nag nap nay net nib nil nip nit nod nun nut
oaf oak oar oat ode opt orb orc ore owe owl pad pal pan par pat paw pea peg pen pep
per pet pew pie pig pin pit ply pod pop pot pro pry pub pug pun pup rag ram rap rat
ray rib rig rim rip rob rod roe rot rub rue rug rum rut rye sad sag sap sew sin sip
sir sly sob sod sow soy spa spy sty sub sue sum sup tab tag tan tap tar tea tee thy
tip toe ton tot tow tub tug urn vat vet vex vie vim vow wad wag wan wax wed wee wet
wig wit woe won woo wow yak yam yap yea yen yew yon zap zip zoo
able also area army away back bank base bear beat been best bird blow blue boat body
bold bone book born both call came camp card care cart cave city coat cold come cook
cool corn cost dark dead deal dear deep deer door down draw drew drop dust duty each
east easy edge else even ever face fact fail fair fall fast fear feel feet fell felt
file fill find fine fire fish five flat fled flew food foot form four free from full
gain game gate gave gift girl give glad goes gold gone good gray grew grey grow half
hall hand hang hard have head hear heat held hell help here hide high hill hold hole
home hope horn hour huge hung hunt idea inch into iron item join jump just keep kept
kill kind king knew know lack lady laid lake land last late lead left less life lift
like line lion list live lock long look lord lose loss lost loud love luck made mail
main make many mark mass meal mean meet mind mine miss mist more most move much must
name near neck need next nice nine none nose note once only open over pace pack page
paid pain pair pale part pass past path pick pile plan play plus pool poor pull pure
push race rain rank rare read real rest rich ride ring rise risk road rock role roll
roof room rope rose rule rush safe said sail sake salt same sand save seat seem seen
self sell send sent ship shop shot show shut sick side sign sing sink size skin slow
snow soft soil sold some song soon sort soul spot star stay step stop such suit sure
tail take tale talk tall task team tell tend tent term test text than that them then
they thin this thus tide till time tiny told tone took tool torn tour town tree trip
true turn twin type unit upon used vast very view wait wake walk wall want warm wary
wash wave weak wear week well went were west what when whom wide wife wild will wind
wine wing wire wise wish with wolf wood word wore work yard year your zone
about above after again along among angry armor armour arrow began begin being below
blade blood board bread break brief bring broad brown build built carry catch cause
chain chair chest chief child claim class clean clear climb close cloth cloud coins
could count court cover crowd dance death doing doors dozen dream dress drink drive
early earth eight empty enemy enter equal event every exact extra faith false field
fight final first flame floor force forth found front fruit given glass globe going
grand grass great green group guard guess guide happy heart heavy horse hours house
human knife known large later laugh learn least leave level light limit lives magic
march match maybe means metal might money month mouth music never night noise north
occur often order other paper party peace piece place plain plant point power press
price pride prove quick quiet quite raise range reach ready right river round royal
scale score sense seven shall shape share sharp shield short sight since skill sleep
small smell smile sound south space speak spell spend spent stage stair stand start
state steel steep still stone stood store storm story sword table taken teeth their
there these thick thing think third those three throw tower trade trail train treat
trial tried truly trust truth under until upper usual valley value voice wagon watch
water wheel where which while white whole whose woman women world worse worth would
wound write wrong young
across almost always amount animal answer appear around arrive attack battle become
before behind beside better beyond bottle bridge bright broken castle centre center
chance change choose circle corner course danger desert dragon effect either enough
escape expect family famous figure finger follow forest friend garden gather gentle
ground growth guards health heaven hidden inside island itself jewels larger letter
little living lonely manage market matter middle minute modern moment monster mostly
nature nearly number object office others palace people person picture places plenty
pocket poison potion prince priest public purse rather reason record remain remove
return rising second secret should silver simple single sister slowly spirit spring
square stairs stamina street strong suffer summer supply temple thirty though toward
travel turned valley warrior wealth window winter wisdom within wizard wonder wooden
yellow
another because between brother captain chamber company country dungeon evening
finally forward further general however kingdom lantern machine message morning
nothing opening outside passage perhaps picture present problem provide quickly
reached remains several soldier someone something special stopped strange through
tonight village warning without
adventure equipment provisions
";

static DICTIONARY: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| WORDS.split_whitespace().collect());

/// Case-insensitive lookup of a bare alphabetic token.
pub fn is_word(token: &str) -> bool {
    if token.is_empty() || !token.chars().all(|c| c.is_alphabetic()) {
        return false;
    }
    if token.chars().all(|c| c.is_lowercase()) {
        return DICTIONARY.contains(token);
    }
    DICTIONARY.contains(token.to_lowercase().as_str())
}

/// Upper-case initial followed only by lower-case letters, e.g. `Zagor`.
pub fn is_capitalized_name(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => {
            let rest: Vec<char> = chars.collect();
            !rest.is_empty() && rest.iter().all(|c| c.is_lowercase())
        }
        _ => false,
    }
}
