use super::owid::covid_archive::OwidCovidArchive;

pub struct ProdDb {}

impl ProdDb {
    pub fn owid_covid() -> OwidCovidArchive {
        OwidCovidArchive {
            url: "https://covid.ourworldindata.org/data/owid-covid-data.csv".to_string(),
        }
    }
}
